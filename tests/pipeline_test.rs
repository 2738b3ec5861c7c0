use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use transport_opt::error::ExtractionError;
use transport_opt::infrastructure::{JobHandle, LaunchRequest};
use transport_opt::models::{Boundary, DofSpace, Namelist};
use transport_opt::services::RunLog;
use transport_opt::workflow::evaluator::weighted_objective;
use transport_opt::{
    App, AppResult, ArtifactReader, Config, Evaluator, Pipeline, RunState, Scheduler, Status,
    StatusClassifier,
};

const SFINCS_TEMPLATE: &str = "&geometryParameters\n  rN_wish = 0.5\n  equilibriumFile = \"x\"\n/\n&speciesParameters\n  Zs = 1\n  mHats = 1\n  nHats = 1\n  dnHatdrHats = 0\n  THats = 1\n  dTHatdrHats = 0\n/\n&physicsParameters\n  Er = 0\n/\n";

const FULL_VMEC: &str = "&INDATA\n  NFP = 4\n  PHIEDGE = 0.5\n  RBC(0,0) = 1.0  ZBS(0,0) = 0.0\n  RBC(0,1) = 0.2  ZBS(0,1) = 0.2\n/\n";

/// 第一阶段作业的结局
#[derive(Clone, Copy)]
enum Stage1Script {
    Done,
    DoneWithoutWout,
    StepLimit,
    TimeLimit,
}

/// 把输出直接写进重定向文件的调度器
#[derive(Default)]
struct ScriptedScheduler {
    stage1: Mutex<VecDeque<Stage1Script>>,
    stage1_launches: AtomicUsize,
    stage2_launches: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedScheduler {
    fn with_stage1(script: &[Stage1Script]) -> Self {
        Self {
            stage1: Mutex::new(script.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn launches(&self) -> (usize, usize) {
        (
            self.stage1_launches.load(Ordering::SeqCst),
            self.stage2_launches.load(Ordering::SeqCst),
        )
    }
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

#[async_trait]
impl Scheduler for ScriptedScheduler {
    async fn submit(&self, request: &LaunchRequest) -> AppResult<JobHandle> {
        let is_vmec = request.task.to_string_lossy().contains("VMEC");
        if is_vmec {
            self.stage1_launches.fetch_add(1, Ordering::SeqCst);
            let script = self
                .stage1
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Stage1Script::Done);
            match script {
                Stage1Script::Done => {
                    append(&request.stdout, "EXECUTION TERMINATED NORMALLY\n");
                    append(&request.stderr, "");
                    std::fs::write(request.work_dir.join("wout_vmec.nc"), b"netcdf").unwrap();
                }
                Stage1Script::DoneWithoutWout => {
                    append(&request.stdout, "EXECUTION TERMINATED NORMALLY\n");
                    append(&request.stderr, "");
                }
                Stage1Script::StepLimit => {
                    append(&request.stdout, "iterating\n");
                    append(&request.stderr, "srun: Step limit reached for this job\n");
                }
                Stage1Script::TimeLimit => {
                    append(&request.stdout, "iterating\n");
                    append(&request.stderr, "slurmstepd: CANCELLED DUE TO TIME LIMIT\n");
                }
            }
        } else {
            self.stage2_launches.fetch_add(1, Ordering::SeqCst);
            append(&request.stdout, "ELAPSED TIME 1.0\n");
            append(&request.stderr, "");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        Ok(JobHandle::new(request.work_dir.clone(), async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(0))
        }))
    }

    async fn queued_job_ids(&self, _user: &str) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn job_work_dir(&self, _job_id: &str) -> AppResult<Option<PathBuf>> {
        Ok(None)
    }

    async fn cancel(&self, _job_id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// 每个结果目录返回固定的两个值，`broken` 结尾的目录读取失败
struct FixedReader {
    values: [f64; 2],
    broken: Option<&'static str>,
}

#[async_trait]
impl ArtifactReader for FixedReader {
    async fn read(&self, dir: &Path) -> AppResult<Vec<f64>> {
        if let Some(suffix) = self.broken {
            if dir.ends_with(suffix) {
                return Err(ExtractionError::Malformed {
                    path: dir.join("sfincsOutput.h5"),
                    reason: "truncated".to_string(),
                }
                .into());
            }
        }
        Ok(self.values.to_vec())
    }
}

fn workspace(max_concurrent: usize) -> (TempDir, Config) {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("input.namelist"), SFINCS_TEMPLATE).unwrap();
    std::fs::write(tmp.path().join("input.vmec"), FULL_VMEC).unwrap();

    let mut config = Config::default();
    config.paths.root = tmp.path().to_path_buf();
    config.scheduler.max_concurrent = max_concurrent;
    config.scheduler.job_tag = Some("4242".to_string());
    (tmp, config)
}

fn evaluator(
    config: &Config,
    scheduler: Arc<ScriptedScheduler>,
    reader: FixedReader,
) -> Evaluator {
    let dofs = DofSpace::new(Boundary::parse(FULL_VMEC), false, None);
    let stripped = Namelist::parse(&Boundary::strip(FULL_VMEC)).unwrap();
    Evaluator::new(
        Arc::new(config.clone()),
        scheduler,
        Arc::new(reader),
        dofs,
        stripped,
    )
}

fn run_state(config: &Config) -> RunState {
    RunState::new(RunLog::create(config.paths.resolve(&config.paths.log_file)).unwrap())
}

#[tokio::test]
async fn test_evaluation_runs_both_stages() {
    let (tmp, config) = workspace(6);
    let scheduler = Arc::new(ScriptedScheduler::default());
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    let j = assert_ok!(eval.evaluate(&mut state, &x).await);

    assert_eq!(scheduler.launches(), (1, 6));
    let expected = weighted_objective(
        &[0.0; 12],
        &config.objective.flat_targets(),
        &config.objective.flat_weights(),
    );
    assert!((j - expected).abs() < 1e-15);

    let stage1 = tmp.path().join("00000_000");
    assert!(stage1.join("out.4242").is_file());
    assert!(stage1.join("002").join("01").join("wout_vmec.nc").is_file());
    assert_eq!(state.iteration, 1);

    let records = state.log.read().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].values.len(), 12);
    assert_eq!(records[0].x, x);
}

#[tokio::test]
async fn test_step_limit_aborts_before_fan_out() {
    let (tmp, config) = workspace(6);
    let scheduler = Arc::new(ScriptedScheduler::with_stage1(&[Stage1Script::StepLimit]));
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    let err = assert_err!(eval.evaluate(&mut state, &x).await);

    assert!(err.is_fatal());
    assert_eq!(scheduler.launches(), (1, 0));
    assert!(!tmp.path().join("00000_000").join("000").exists());
    assert!(state.log.read().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_artifact_yields_sentinel_objective() {
    let (_tmp, config) = workspace(6);
    let scheduler = Arc::new(ScriptedScheduler::default());
    let eval = evaluator(
        &config,
        scheduler,
        FixedReader {
            values: [1e-4, 2e-4],
            broken: Some("001/01"),
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    let j = assert_ok!(eval.evaluate(&mut state, &x).await);

    let sentinel = config.objective.sentinel;
    let expected = weighted_objective(
        &[sentinel; 12],
        &config.objective.flat_targets(),
        &config.objective.flat_weights(),
    );
    assert!((j - expected).abs() <= 1e-9 * expected);

    let records = state.log.read().unwrap();
    assert_eq!(records[0].values.len(), 11);
    assert_eq!(records[0].values.iter().filter(|v| **v == sentinel).count(), 1);
}

#[tokio::test]
async fn test_missing_wout_yields_sentinel_and_leaves_no_partial_dirs() {
    let (tmp, config) = workspace(6);
    let scheduler = Arc::new(ScriptedScheduler::with_stage1(&[Stage1Script::DoneWithoutWout]));
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    let j = assert_ok!(eval.evaluate(&mut state, &x).await);

    let sentinel = config.objective.sentinel;
    let expected = weighted_objective(
        &[sentinel; 12],
        &config.objective.flat_targets(),
        &config.objective.flat_weights(),
    );
    assert!((j - expected).abs() <= 1e-9 * expected);
    assert_eq!(scheduler.launches(), (1, 0));
    assert_eq!(state.iteration, 1);
    assert!(state.log.read().unwrap()[0].values.is_empty());

    let dir = tmp.path().join("00000_000");
    assert!(!dir.join("000").join("00").exists());

    // 输出文件补上后，下一次运行能正常展开
    std::fs::write(dir.join("wout_vmec.nc"), b"netcdf").unwrap();
    let pipeline = Pipeline::new(Arc::new(config.clone()), scheduler.clone());
    let report = assert_ok!(pipeline.run(std::slice::from_ref(&dir)).await);
    assert_eq!(report.stage2_dirs.len(), 6);
    assert_eq!(scheduler.launches(), (1, 6));
}

#[tokio::test]
async fn test_rerun_launches_nothing() {
    let (tmp, config) = workspace(6);
    let scheduler = Arc::new(ScriptedScheduler::default());
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();
    assert_ok!(eval.evaluate(&mut state, &x).await);

    let dir = tmp.path().join("00000_000");
    let vmec_before = std::fs::read_to_string(dir.join("input.vmec")).unwrap();
    let pipeline = Pipeline::new(Arc::new(config.clone()), scheduler.clone());
    let report = assert_ok!(pipeline.run(std::slice::from_ref(&dir)).await);

    assert_eq!(report.launches(), 0);
    assert!(report.stage2_dirs.is_empty());
    assert_eq!(scheduler.launches(), (1, 6));
    assert_eq!(
        std::fs::read_to_string(dir.join("input.vmec")).unwrap(),
        vmec_before
    );
}

#[tokio::test]
async fn test_concurrency_cap_across_stage2_waves() {
    let (_tmp, config) = workspace(4);
    let scheduler = Arc::new(ScriptedScheduler::default());
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    assert_ok!(eval.evaluate(&mut state, &x).await);

    assert_eq!(scheduler.launches(), (1, 6));
    assert!(scheduler.peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(scheduler.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage1_retry_uses_fresh_output_files() {
    let (tmp, mut config) = workspace(6);
    config.scheduler.stage1_attempts = 2;
    let scheduler = Arc::new(ScriptedScheduler::with_stage1(&[
        Stage1Script::TimeLimit,
        Stage1Script::Done,
    ]));
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    assert_ok!(eval.evaluate(&mut state, &x).await);

    let dir = tmp.path().join("00000_000");
    assert_eq!(scheduler.launches(), (2, 6));
    assert!(dir.join("err.4242").is_file());
    assert!(dir.join("out.4242_2").is_file());

    let classifier = StatusClassifier::new(scheduler.as_ref(), "tester");
    assert_eq!(classifier.classify(&dir).await.unwrap(), Status::VmecDone);
}

#[tokio::test]
async fn test_single_attempt_leaves_time_limited_dir() {
    let (tmp, config) = workspace(6);
    let scheduler = Arc::new(ScriptedScheduler::with_stage1(&[Stage1Script::TimeLimit]));
    let eval = evaluator(
        &config,
        scheduler.clone(),
        FixedReader {
            values: [0.0, 0.0],
            broken: None,
        },
    );
    let mut state = run_state(&config);
    let x = eval.dofs().initial();

    let j = assert_ok!(eval.evaluate(&mut state, &x).await);

    assert_eq!(scheduler.launches(), (1, 0));
    assert!(state.log.read().unwrap()[0].values.is_empty());
    let sentinel = config.objective.sentinel;
    let expected = weighted_objective(
        &[sentinel; 12],
        &config.objective.flat_targets(),
        &config.objective.flat_weights(),
    );
    assert!((j - expected).abs() <= 1e-9 * expected);

    let classifier = StatusClassifier::new(scheduler.as_ref(), "tester");
    let status = classifier
        .classify(&tmp.path().join("00000_000"))
        .await
        .unwrap();
    assert_eq!(status, Status::Time);
}

#[tokio::test]
async fn test_app_runs_short_optimization() {
    let (tmp, mut config) = workspace(6);
    config.optimizer.maxiter = 1;
    config.optimizer.seed = Some(3);
    let scheduler = Arc::new(ScriptedScheduler::default());
    let reader = Arc::new(FixedReader {
        values: [0.0, 0.0],
        broken: None,
    });

    let app = App::with_components(config, scheduler.clone(), reader)
        .await
        .unwrap();
    assert_eq!(app.bounds().len(), 2);
    let result = app.run().await.unwrap();

    assert!(result.nfev >= 5);
    assert_eq!(scheduler.launches().0, result.nfev);
    assert!(tmp.path().join("stripped_input.vmec").is_file());
    assert!(tmp.path().join("dof_names.json").is_file());
    assert!(tmp.path().join("x.json").is_file());

    let log = std::fs::read_to_string(tmp.path().join("log.txt")).unwrap();
    assert_eq!(log.lines().count(), result.nfev + 1);
    assert!(log.starts_with("iter, DOFvals, Lvals, J"));
}

#[tokio::test]
async fn test_app_rejects_input_without_free_dofs() {
    let (tmp, config) = workspace(6);
    std::fs::write(
        tmp.path().join("input.vmec"),
        "&INDATA\n  NFP = 4\n  RBC(0,0) = 1.0\n/\n",
    )
    .unwrap();
    let reader = Arc::new(FixedReader {
        values: [0.0, 0.0],
        broken: None,
    });

    let scheduler = Arc::new(ScriptedScheduler::default());
    let result = App::with_components(config, scheduler, reader).await;

    assert!(result.is_err());
    assert!(!tmp.path().join("dof_names.json").exists());
}
