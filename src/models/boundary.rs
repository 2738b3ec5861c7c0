//! VMEC 边界傅里叶系数与优化自由度
//!
//! 从完整的 VMEC 输入文件中读取 `RBC(n,m)` / `ZBS(n,m)`（以及非对称的
//! `RBS` / `ZBC`）系数，生成优化器使用的自由度向量，再把候选向量渲染回
//! 边界系数行写入第一阶段输入文件。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::namelist::parse_fortran_real;

/// 系数种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoefficientKind {
    Rbc,
    Zbs,
    Rbs,
    Zbc,
}

impl CoefficientKind {
    fn vmec_name(self) -> &'static str {
        match self {
            CoefficientKind::Rbc => "RBC",
            CoefficientKind::Zbs => "ZBS",
            CoefficientKind::Rbs => "RBS",
            CoefficientKind::Zbc => "ZBC",
        }
    }

    fn dof_prefix(self) -> &'static str {
        match self {
            CoefficientKind::Rbc => "rc",
            CoefficientKind::Zbs => "zs",
            CoefficientKind::Rbs => "rs",
            CoefficientKind::Zbc => "zc",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RBC" => Some(CoefficientKind::Rbc),
            "ZBS" => Some(CoefficientKind::Zbs),
            "RBS" => Some(CoefficientKind::Rbs),
            "ZBC" => Some(CoefficientKind::Zbc),
            _ => None,
        }
    }
}

/// 一个傅里叶模式，排序为 (种类, m, n)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mode {
    pub kind: CoefficientKind,
    pub m: i32,
    pub n: i32,
}

impl Mode {
    pub fn new(kind: CoefficientKind, m: i32, n: i32) -> Self {
        Self { kind, m, n }
    }

    /// 自由度名称，例如 `rc(1,-1)`
    pub fn dof_name(&self) -> String {
        format!("{}({},{})", self.kind.dof_prefix(), self.m, self.n)
    }

    /// 主半径 `RBC(0,0)`
    pub fn is_major_radius(&self) -> bool {
        self.kind == CoefficientKind::Rbc && self.m == 0 && self.n == 0
    }

    /// 恒为零、不参与优化的 (0,0) 正弦类系数
    fn is_trivial(&self) -> bool {
        matches!(self.kind, CoefficientKind::Zbs | CoefficientKind::Rbs)
            && self.m == 0
            && self.n == 0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // VMEC 的下标顺序是 (n, m)
        write!(f, "{}({},{})", self.kind.vmec_name(), self.n, self.m)
    }
}

fn coefficient_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(RBC|ZBS|RBS|ZBC)\s*\(\s*(-?\d+)\s*,\s*(-?\d+)\s*\)\s*=\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eEdD][-+]?\d+)?)\s*,?",
        )
        .expect("boundary coefficient regex")
    })
}

fn code_part(line: &str) -> &str {
    line.split('!').next().unwrap_or("")
}

/// 边界系数集合
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Boundary {
    coefficients: BTreeMap<Mode, f64>,
}

impl Boundary {
    /// 从 VMEC 输入文本中解析边界系数（同一模式重复出现时后者覆盖前者）
    pub fn parse(text: &str) -> Self {
        let mut coefficients = BTreeMap::new();
        for line in text.lines() {
            for caps in coefficient_regex().captures_iter(code_part(line)) {
                let (Some(kind), Ok(n), Ok(m), Some(value)) = (
                    CoefficientKind::parse(&caps[1]),
                    caps[2].parse::<i32>(),
                    caps[3].parse::<i32>(),
                    parse_fortran_real(&caps[4]),
                ) else {
                    continue;
                };
                coefficients.insert(Mode::new(kind, m, n), value);
            }
        }
        Self { coefficients }
    }

    /// 删除文本中的所有边界系数赋值，得到"剥离"后的输入
    pub fn strip(text: &str) -> String {
        let mut out = Vec::new();
        for line in text.lines() {
            let code = code_part(line);
            if !coefficient_regex().is_match(code) {
                out.push(line.to_string());
                continue;
            }
            let remainder = coefficient_regex().replace_all(code, "");
            if !remainder.trim().is_empty() {
                out.push(remainder.trim_end().to_string());
            }
        }
        let mut stripped = out.join("\n");
        if text.ends_with('\n') {
            stripped.push('\n');
        }
        stripped
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn get(&self, mode: &Mode) -> Option<f64> {
        self.coefficients.get(mode).copied()
    }

    pub fn set(&mut self, mode: Mode, value: f64) {
        self.coefficients.insert(mode, value);
    }

    pub fn modes(&self) -> impl Iterator<Item = &Mode> {
        self.coefficients.keys()
    }

    /// 渲染为 VMEC 边界系数行（每个系数一行）
    pub fn render(&self) -> String {
        self.coefficients
            .iter()
            .map(|(mode, value)| format!("  {} = {:.16e}", mode, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 优化空间：边界自由度，外加可选的 PHIEDGE（位于向量末尾）
#[derive(Debug, Clone)]
pub struct DofSpace {
    boundary: Boundary,
    free: Vec<Mode>,
    phiedge: Option<f64>,
}

impl DofSpace {
    /// 建立优化空间
    ///
    /// `RBC(0,0)` 只有在 `unfix_major_radius` 时才是自由度。
    pub fn new(boundary: Boundary, unfix_major_radius: bool, phiedge: Option<f64>) -> Self {
        let free = boundary
            .modes()
            .filter(|mode| !mode.is_trivial())
            .filter(|mode| unfix_major_radius || !mode.is_major_radius())
            .copied()
            .collect();
        Self {
            boundary,
            free,
            phiedge,
        }
    }

    pub fn len(&self) -> usize {
        self.free.len() + usize::from(self.phiedge.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_phiedge(&self) -> bool {
        self.phiedge.is_some()
    }

    /// 初始自由度向量
    pub fn initial(&self) -> Vec<f64> {
        let mut x: Vec<f64> = self
            .free
            .iter()
            .map(|mode| self.boundary.get(mode).unwrap_or(0.0))
            .collect();
        if let Some(phiedge) = self.phiedge {
            x.push(phiedge);
        }
        x
    }

    /// 自由度名称
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.free.iter().map(Mode::dof_name).collect();
        if self.phiedge.is_some() {
            names.push("phiedge".to_string());
        }
        names
    }

    /// 把候选向量应用到边界上，返回 (新边界, PHIEDGE)
    pub fn apply(&self, x: &[f64]) -> (Boundary, Option<f64>) {
        let mut boundary = self.boundary.clone();
        for (mode, value) in self.free.iter().zip(x) {
            boundary.set(*mode, *value);
        }
        let phiedge = self
            .phiedge
            .and_then(|_| x.get(self.free.len()).copied());
        (boundary, phiedge)
    }
}

/// 每个自由度的搜索区间 `[(1-a)x, (1+a)x]`，保证下界不大于上界
pub fn auto_bounds(x: &[f64], autobound: f64) -> Vec<(f64, f64)> {
    x.iter()
        .map(|&v| {
            let a = v * (1.0 - autobound);
            let b = v * (1.0 + autobound);
            (a.min(b), a.max(b))
        })
        .collect()
}
