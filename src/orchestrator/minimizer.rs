//! 全局优化器 - 编排层
//!
//! 差分进化（best1bin）：Halton 序列初始化种群，每代抖动变异系数，
//! 二项交叉，整代求值后统一替换（deferred updating），
//! 种群目标值的标准差足够小时收敛。
//!
//! 目标函数一次只求值一个候选向量；并行发生在流水线内部。

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::OptimizerConfig;
use crate::error::AppResult;

/// 目标函数
#[async_trait]
pub trait Objective: Send {
    async fn evaluate(&mut self, x: &[f64]) -> AppResult<f64>;
}

/// 优化结果
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeResult {
    pub x: Vec<f64>,
    pub fun: f64,
    /// 完成的代数
    pub nit: usize,
    /// 目标函数求值次数
    pub nfev: usize,
    /// 是否满足收敛判据
    pub converged: bool,
}

/// 有界全局优化器
#[async_trait]
pub trait Minimizer: Send {
    async fn minimize(
        &mut self,
        objective: &mut dyn Objective,
        bounds: &[(f64, f64)],
    ) -> AppResult<MinimizeResult>;
}

/// 差分进化
pub struct DifferentialEvolution {
    maxiter: usize,
    popsize: usize,
    tol: f64,
    atol: f64,
    mutation: (f64, f64),
    recombination: f64,
    rng: StdRng,
}

impl DifferentialEvolution {
    pub fn new(config: &OptimizerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let [lo, hi] = config.mutation;
        Self {
            maxiter: config.maxiter,
            popsize: config.popsize.max(1),
            tol: config.tol,
            atol: config.atol,
            mutation: (lo.min(hi), lo.max(hi)),
            recombination: config.recombination.clamp(0.0, 1.0),
            rng,
        }
    }

    /// 种群规模：popsize × 维数，至少 5
    pub fn population_size(&self, dim: usize) -> usize {
        (self.popsize * dim).max(5)
    }

    fn dither(&mut self) -> f64 {
        let (lo, hi) = self.mutation;
        if hi > lo {
            self.rng.gen_range(lo..hi)
        } else {
            lo
        }
    }

    /// 从种群中取与 `exclude` 不同、互不相同的两个下标
    fn pick_two(&mut self, n: usize, exclude: usize) -> (usize, usize) {
        let pick = |taken: &[usize], rng: &mut StdRng| loop {
            let k = rng.gen_range(0..n);
            if !taken.contains(&k) {
                return k;
            }
        };
        let a = pick(&[exclude], &mut self.rng);
        let b = pick(&[exclude, a], &mut self.rng);
        (a, b)
    }

    /// best1bin 试验向量（单位超立方体内）
    fn trial(&mut self, population: &[Vec<f64>], best: usize, i: usize, f: f64) -> Vec<f64> {
        let dim = population[i].len();
        let (r1, r2) = self.pick_two(population.len(), i);
        let fill = self.rng.gen_range(0..dim);
        let mut trial = population[i].clone();
        for k in 0..dim {
            if k == fill || self.rng.gen::<f64>() < self.recombination {
                trial[k] = population[best][k] + f * (population[r1][k] - population[r2][k]);
            }
            if !(0.0..=1.0).contains(&trial[k]) {
                trial[k] = self.rng.gen::<f64>();
            }
        }
        trial
    }

    fn converged(&self, energies: &[f64]) -> bool {
        if energies.iter().any(|e| !e.is_finite()) {
            return false;
        }
        let n = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / n;
        let var = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        var.sqrt() <= self.atol + self.tol * mean.abs()
    }
}

/// 单位坐标映射回边界内
pub fn scale(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    unit.iter()
        .zip(bounds)
        .map(|(u, (lo, hi))| lo + u * (hi - lo))
        .collect()
}

/// 第 `index` 个 Halton 点（基为前 `dim` 个素数，跳过原点）
pub fn halton(index: usize, dim: usize) -> Vec<f64> {
    primes(dim)
        .into_iter()
        .map(|base| radical_inverse(index + 1, base))
        .collect()
}

fn radical_inverse(mut i: usize, base: usize) -> f64 {
    let mut result = 0.0;
    let mut f = 1.0 / base as f64;
    while i > 0 {
        result += f * (i % base) as f64;
        i /= base;
        f /= base as f64;
    }
    result
}

fn primes(n: usize) -> Vec<usize> {
    let mut found: Vec<usize> = Vec::with_capacity(n);
    let mut candidate = 2;
    while found.len() < n {
        if found.iter().all(|p| candidate % p != 0) {
            found.push(candidate);
        }
        candidate += 1;
    }
    found
}

fn energy(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (i, v)| if *v < values[best] { i } else { best })
}

#[async_trait]
impl Minimizer for DifferentialEvolution {
    async fn minimize(
        &mut self,
        objective: &mut dyn Objective,
        bounds: &[(f64, f64)],
    ) -> AppResult<MinimizeResult> {
        let dim = bounds.len();
        if dim == 0 {
            let fun = energy(objective.evaluate(&[]).await?);
            info!("没有自由度，只求值一次: J = {}", fun);
            return Ok(MinimizeResult {
                x: Vec::new(),
                fun,
                nit: 0,
                nfev: 1,
                converged: true,
            });
        }

        let size = self.population_size(dim);
        let mut nfev = 0;

        let mut population: Vec<Vec<f64>> = (0..size).map(|i| halton(i, dim)).collect();
        let mut energies = Vec::with_capacity(size);
        for member in &population {
            energies.push(energy(objective.evaluate(&scale(member, bounds)).await?));
            nfev += 1;
        }
        let mut best = argmin(&energies);
        info!("初始种群 {} 个，最优 J = {}", size, energies[best]);

        let mut nit = 0;
        let mut converged = self.converged(&energies);
        while !converged && nit < self.maxiter {
            nit += 1;
            let f = self.dither();
            let trials: Vec<Vec<f64>> = (0..size)
                .map(|i| self.trial(&population, best, i, f))
                .collect();

            let mut trial_energies = Vec::with_capacity(size);
            for trial in &trials {
                trial_energies.push(energy(objective.evaluate(&scale(trial, bounds)).await?));
                nfev += 1;
            }

            for (i, (trial, e)) in trials.into_iter().zip(trial_energies).enumerate() {
                if e <= energies[i] {
                    population[i] = trial;
                    energies[i] = e;
                }
            }
            best = argmin(&energies);
            converged = self.converged(&energies);
            debug!("第 {} 代: F = {:.3}", nit, f);
            info!("🧬 第 {} 代完成，最优 J = {}", nit, energies[best]);
        }

        Ok(MinimizeResult {
            x: scale(&population[best], bounds),
            fun: energies[best],
            nit,
            nfev,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, JobError};

    struct Sphere {
        calls: usize,
    }

    #[async_trait]
    impl Objective for Sphere {
        async fn evaluate(&mut self, x: &[f64]) -> AppResult<f64> {
            self.calls += 1;
            Ok(x.iter().map(|v| (v - 0.25).powi(2)).sum())
        }
    }

    struct FailsAt(usize);

    #[async_trait]
    impl Objective for FailsAt {
        async fn evaluate(&mut self, _x: &[f64]) -> AppResult<f64> {
            if self.0 == 0 {
                return Err(JobError::StepLimit { dir: "00000_000".into() }.into());
            }
            self.0 -= 1;
            Ok(1.0)
        }
    }

    fn settings() -> OptimizerConfig {
        OptimizerConfig {
            popsize: 10,
            maxiter: 300,
            tol: 0.0,
            atol: 1e-12,
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_halton_points() {
        assert_eq!(halton(0, 2), vec![0.5, 1.0 / 3.0]);
        assert_eq!(halton(1, 2), vec![0.25, 2.0 / 3.0]);
        assert_eq!(primes(5), vec![2, 3, 5, 7, 11]);
    }

    #[test]
    fn test_population_size_has_floor() {
        let de = DifferentialEvolution::new(&OptimizerConfig::default());
        assert_eq!(de.population_size(1), 5);
        assert_eq!(de.population_size(8), 8);
    }

    #[tokio::test]
    async fn test_sphere_converges() {
        let mut de = DifferentialEvolution::new(&settings());
        let mut sphere = Sphere { calls: 0 };
        let bounds = [(-1.0, 1.0), (-1.0, 1.0)];
        let result = de.minimize(&mut sphere, &bounds).await.unwrap();

        assert!(result.fun < 1e-6, "fun = {}", result.fun);
        assert!(result.x.iter().all(|v| (v - 0.25).abs() < 1e-2));
        assert_eq!(result.nfev, sphere.calls);
        assert_eq!(result.nfev, 20 * (result.nit + 1));
    }

    #[tokio::test]
    async fn test_zero_width_bounds_stay_fixed() {
        let mut de = DifferentialEvolution::new(&settings());
        let mut sphere = Sphere { calls: 0 };
        let bounds = [(0.0, 0.0), (-1.0, 1.0)];
        let result = de.minimize(&mut sphere, &bounds).await.unwrap();
        assert_eq!(result.x[0], 0.0);
    }

    #[tokio::test]
    async fn test_objective_error_stops_minimizer() {
        let mut de = DifferentialEvolution::new(&settings());
        let err = de
            .minimize(&mut FailsAt(3), &[(0.0, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Job(JobError::StepLimit { .. })));
    }

    #[tokio::test]
    async fn test_empty_bounds_evaluate_once() {
        let mut de = DifferentialEvolution::new(&settings());
        let mut sphere = Sphere { calls: 0 };
        let result = de.minimize(&mut sphere, &[]).await.unwrap();
        assert!(result.x.is_empty());
        assert_eq!(result.nfev, 1);
        assert_eq!(sphere.calls, 1);
        assert_eq!(result.fun, 0.0);
    }

    #[tokio::test]
    async fn test_identical_energies_converge_immediately() {
        let mut de = DifferentialEvolution::new(&OptimizerConfig {
            seed: Some(1),
            ..Default::default()
        });
        let mut flat = FailsAt(usize::MAX);
        let result = de.minimize(&mut flat, &[(0.0, 1.0)]).await.unwrap();
        assert!(result.converged);
        assert_eq!(result.nit, 0);
        assert_eq!(result.nfev, 5);
    }
}
