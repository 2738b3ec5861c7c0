//! 输入文件写入服务 - 业务能力层
//!
//! 只负责"把一个工作单元的输入文件准备好"，不关心流程

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::boundary::Boundary;
use crate::models::grid::TransportGrid;
use crate::models::namelist::{Namelist, NamelistValue};
use crate::models::work_unit::WorkUnit;
use crate::utils::absolute;

/// VMEC 输入中的主 namelist 组
pub const VMEC_GROUP: &str = "INDATA";

/// 输入文件写入服务
///
/// 职责：
/// - 第一阶段：复制 SFINCS 模板，生成带候选边界的 VMEC 输入
/// - 第二阶段：复制 VMEC 输出与 SFINCS 模板，改写网格点参数
/// - 只处理单个目录
pub struct InputWriter<'a> {
    config: &'a Config,
}

impl<'a> InputWriter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// 准备第一阶段目录
    ///
    /// 目录已存在时不做任何修改并返回 `false`。
    pub async fn prepare_equilibrium_dir(
        &self,
        dir: &Path,
        stripped_vmec: &Namelist,
        boundary: &Boundary,
        phiedge: Option<f64>,
    ) -> AppResult<bool> {
        if dir.exists() {
            return Ok(false);
        }
        fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::create_dir_failed(dir, e))?;

        let paths = &self.config.paths;
        copy_into(&paths.resolve(&paths.base_sfincs_input), dir).await?;

        let mut vmec = stripped_vmec.clone();
        vmec.append_lines(VMEC_GROUP, &boundary.render())?;
        if let Some(phiedge) = phiedge {
            if !vmec.set(VMEC_GROUP, "PHIEDGE", phiedge) {
                warn!("⚠️ VMEC 输入中没有 PHIEDGE，无法写入 {}", phiedge);
            }
        }

        let target = dir.join(&paths.full_vmec_input);
        fs::write(&target, vmec.to_string())
            .await
            .map_err(|e| AppError::file_write_failed(&target, e))?;

        debug!("第一阶段输入已写入: {}", target.display());
        Ok(true)
    }

    /// 准备第二阶段目录
    ///
    /// 调用方负责检查目录是否已存在。任何一步失败都会删除这个目录，
    /// 存在的第二阶段目录总是完整的。
    pub async fn prepare_transport_dir(&self, stage1_dir: &Path, unit: &WorkUnit) -> AppResult<()> {
        let (surface, species) = unit.grid_point.ok_or_else(|| {
            AppError::Other(format!("{} 不是第二阶段目录", unit.dir.display()))
        })?;

        fs::create_dir_all(&unit.dir)
            .await
            .map_err(|e| AppError::create_dir_failed(&unit.dir, e))?;

        let result = self
            .write_transport_inputs(stage1_dir, unit, surface, species)
            .await;
        if result.is_err() {
            if let Err(e) = fs::remove_dir_all(&unit.dir).await {
                warn!("⚠️ 无法清理未完成的目录 {}: {}", unit.dir.display(), e);
            }
        }
        result
    }

    async fn write_transport_inputs(
        &self,
        stage1_dir: &Path,
        unit: &WorkUnit,
        surface: usize,
        species: usize,
    ) -> AppResult<()> {
        let paths = &self.config.paths;
        let input = copy_into(&stage1_dir.join(&paths.base_sfincs_input), &unit.dir).await?;
        let wout = copy_into(&stage1_dir.join(paths.wout_name()), &unit.dir).await?;
        let wout_abs = absolute(&wout);

        let text = fs::read_to_string(&input)
            .await
            .map_err(|e| AppError::file_read_failed(&input, e))?;
        let mut namelist = Namelist::parse(&text)?;

        let fields = transport_fields(&self.config.grid, surface, species, &wout_abs)?;
        for (group, key, value) in fields {
            if !namelist.set(group, key, value) {
                warn!(
                    "⚠️ {} 中没有找到 &{} {}，保持模板值",
                    input.display(),
                    group,
                    key
                );
            }
        }

        fs::write(&input, namelist.to_string())
            .await
            .map_err(|e| AppError::file_write_failed(&input, e))?;
        Ok(())
    }
}

/// 第二阶段需要改写的变量：(组, 变量, 值)
pub fn transport_fields(
    grid: &TransportGrid,
    surface: usize,
    species: usize,
    wout: &Path,
) -> AppResult<Vec<(&'static str, &'static str, NamelistValue)>> {
    let missing = || AppError::Other(format!("网格点 ({}, {}) 超出范围", surface, species));
    let profile = grid.profile(surface, species).ok_or_else(missing)?;
    let spec = grid.species.get(species).ok_or_else(missing)?;
    let rn = *grid.surfaces.get(surface).ok_or_else(missing)?;
    let er = *grid.er.get(surface).ok_or_else(missing)?;

    Ok(vec![
        ("geometryParameters", "rN_wish", rn.into()),
        (
            "geometryParameters",
            "equilibriumFile",
            wout.to_string_lossy().into_owned().into(),
        ),
        ("speciesParameters", "Zs", spec.z.into()),
        ("speciesParameters", "mHats", spec.m_hat.into()),
        ("speciesParameters", "nHats", profile.n_hat.into()),
        ("speciesParameters", "dnHatdrHats", profile.dn_hat_dr_hat.into()),
        ("speciesParameters", "THats", profile.t_hat.into()),
        ("speciesParameters", "dTHatdrHats", profile.dt_hat_dr_hat.into()),
        ("physicsParameters", "Er", er.into()),
    ])
}

async fn copy_into(source: &Path, dir: &Path) -> AppResult<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| AppError::Other(format!("无效的文件路径: {}", source.display())))?;
    let target = dir.join(name);
    fs::copy(source, &target)
        .await
        .map_err(|e| AppError::copy_failed(source, &target, e))?;
    Ok(target)
}
