use serde::{Deserialize, Serialize};

/// 粒子种类（SFINCS 单位）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// 电荷数 Zs
    pub z: f64,
    /// 质量 mHats
    pub m_hat: f64,
}

/// 某个磁面上某个粒子种类的剖面参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub n_hat: f64,
    pub dn_hat_dr_hat: f64,
    pub t_hat: f64,
    pub dt_hat_dr_hat: f64,
}

/// 第二阶段展开网格：磁面 × 粒子种类
///
/// 所有二维数组的第一维是磁面，第二维是粒子种类。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportGrid {
    /// 磁面位置（SFINCS rN，等于 STELLOPT rho）
    pub surfaces: Vec<f64>,
    /// 每个磁面的径向电场 Er
    pub er: Vec<f64>,
    pub species: Vec<Species>,
    pub n_hats: Vec<Vec<f64>>,
    pub dn_hat_dr_hats: Vec<Vec<f64>>,
    pub t_hats: Vec<Vec<f64>>,
    pub dt_hat_dr_hats: Vec<Vec<f64>>,
}

impl Default for TransportGrid {
    fn default() -> Self {
        Self {
            surfaces: vec![0.25, 0.50, 0.75],
            er: vec![15.0, 15.0, 15.0],
            species: vec![
                Species {
                    z: -1.0,
                    m_hat: 5.446170214863400e-04,
                },
                Species {
                    z: 1.0,
                    m_hat: 2.496634561495773,
                },
            ],
            n_hats: vec![
                vec![1.925759290562555, 1.925759290562555],
                vec![1.8000000003021746, 1.8000000003021746],
                vec![1.5952669602019312, 1.5952669602019312],
            ],
            dn_hat_dr_hats: vec![
                vec![-0.21746074335787643, -0.21746074335787643],
                vec![-0.26725895961109203, -0.26725895961109203],
                vec![-1.1496241130928588, -1.1496241130928588],
            ],
            t_hats: vec![
                vec![14.925059121976009, 14.925059121976009],
                vec![10.000000001797774, 10.000000001797774],
                vec![4.999998821932152, 4.999998821932152],
            ],
            dt_hat_dr_hats: vec![
                vec![-10.625892808407443, -10.625892808407443],
                vec![-9.954507300393985, -9.954507300393985],
                vec![-9.929753618960675, -9.929753618960675],
            ],
        }
    }
}

impl TransportGrid {
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    /// 网格点总数
    pub fn len(&self) -> usize {
        self.surface_count() * self.species_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取 (磁面, 种类) 处的剖面
    pub fn profile(&self, surface: usize, species: usize) -> Option<Profile> {
        Some(Profile {
            n_hat: *self.n_hats.get(surface)?.get(species)?,
            dn_hat_dr_hat: *self.dn_hat_dr_hats.get(surface)?.get(species)?,
            t_hat: *self.t_hats.get(surface)?.get(species)?,
            dt_hat_dr_hat: *self.dt_hat_dr_hats.get(surface)?.get(species)?,
        })
    }

    /// 检查各数组维度是否一致，返回第一个不一致的字段名
    pub fn shape_mismatch(&self) -> Option<&'static str> {
        let rows = self.surface_count();
        let cols = self.species_count();
        if self.er.len() != rows {
            return Some("grid.er");
        }
        let tables: [(&'static str, &Vec<Vec<f64>>); 4] = [
            ("grid.n_hats", &self.n_hats),
            ("grid.dn_hat_dr_hats", &self.dn_hat_dr_hats),
            ("grid.t_hats", &self.t_hats),
            ("grid.dt_hat_dr_hats", &self.dt_hat_dr_hats),
        ];
        tables
            .into_iter()
            .find(|(_, table)| table.len() != rows || table.iter().any(|row| row.len() != cols))
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_is_consistent() {
        let grid = TransportGrid::default();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.shape_mismatch(), None);
        let profile = grid.profile(2, 1).unwrap();
        assert_eq!(profile.t_hat, 4.999998821932152);
        assert!(grid.profile(3, 0).is_none());
    }

    #[test]
    fn test_shape_mismatch_reports_field() {
        let mut grid = TransportGrid::default();
        grid.t_hats[1].pop();
        assert_eq!(grid.shape_mismatch(), Some("grid.t_hats"));

        let mut grid = TransportGrid::default();
        grid.er.push(1.0);
        assert_eq!(grid.shape_mismatch(), Some("grid.er"));
    }
}
