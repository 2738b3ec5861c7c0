//! Fortran namelist 文档
//!
//! 输入文件只解析一次，通过类型化 setter 修改，再原样写回。
//! 不认识的行（注释、空行、多变量行）全部逐字保留。

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::NamelistError;

/// namelist 变量值
#[derive(Debug, Clone, PartialEq)]
pub enum NamelistValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Reals(Vec<f64>),
}

impl fmt::Display for NamelistValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamelistValue::Bool(true) => f.write_str(".true."),
            NamelistValue::Bool(false) => f.write_str(".false."),
            NamelistValue::Int(v) => write!(f, "{}", v),
            NamelistValue::Real(v) => f.write_str(&format_real(*v)),
            NamelistValue::Str(s) => write!(f, "\"{}\"", s),
            NamelistValue::Reals(values) => {
                let joined = values
                    .iter()
                    .map(|v| format_real(*v))
                    .collect::<Vec<_>>()
                    .join(" ");
                f.write_str(&joined)
            }
        }
    }
}

impl From<f64> for NamelistValue {
    fn from(v: f64) -> Self {
        NamelistValue::Real(v)
    }
}

impl From<i64> for NamelistValue {
    fn from(v: i64) -> Self {
        NamelistValue::Int(v)
    }
}

impl From<bool> for NamelistValue {
    fn from(v: bool) -> Self {
        NamelistValue::Bool(v)
    }
}

impl From<&str> for NamelistValue {
    fn from(v: &str) -> Self {
        NamelistValue::Str(v.to_string())
    }
}

impl From<String> for NamelistValue {
    fn from(v: String) -> Self {
        NamelistValue::Str(v)
    }
}

impl From<Vec<f64>> for NamelistValue {
    fn from(v: Vec<f64>) -> Self {
        NamelistValue::Reals(v)
    }
}

impl From<&[f64]> for NamelistValue {
    fn from(v: &[f64]) -> Self {
        NamelistValue::Reals(v.to_vec())
    }
}

/// 与 Python `repr(float)` 相同的切换点：极小或极大时使用指数形式
pub fn format_real(v: f64) -> String {
    let abs = v.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        format!("{:e}", v)
    } else {
        format!("{}", v)
    }
}

/// 解析 Fortran 实数（支持 `1.0D-3` 写法）
pub fn parse_fortran_real(s: &str) -> Option<f64> {
    s.trim().replace(['d', 'D'], "e").parse().ok()
}

/// 一个赋值行：`<缩进><变量><分隔符><值><尾部>`
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    indent: String,
    key: String,
    separator: String,
    value: String,
    tail: String,
}

impl Entry {
    fn render(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.indent, self.key, self.separator, self.value, self.tail
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Raw(String),
    Entry(Entry),
}

#[derive(Debug, Clone, PartialEq)]
struct Group {
    header: String,
    name: String,
    lines: Vec<Line>,
    terminator: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Raw(String),
    Group(Group),
}

/// 结构化 namelist 文档
#[derive(Debug, Clone, PartialEq)]
pub struct Namelist {
    items: Vec<Item>,
    trailing_newline: bool,
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)([A-Za-z_][A-Za-z0-9_%]*(?:\s*\([^)]*\))?)(\s*=\s*)(.*)$")
            .expect("namelist entry regex")
    })
}

/// 找到引号之外的第一个 `!` 注释起点
fn comment_start(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '\'') | (None, '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '!') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_entry(line: &str) -> Option<Entry> {
    let caps = entry_regex().captures(line)?;
    let rest = caps.get(4).map_or("", |m| m.as_str());
    let split = comment_start(rest).unwrap_or(rest.len());
    let value_part = &rest[..split];
    let value = value_part.trim_end();
    let tail = format!("{}{}", &value_part[value.len()..], &rest[split..]);
    Some(Entry {
        indent: caps[1].to_string(),
        key: caps[2].to_string(),
        separator: caps[3].to_string(),
        value: value.to_string(),
        tail,
    })
}

fn is_terminator(trimmed: &str) -> bool {
    trimmed.starts_with('/') || trimmed.eq_ignore_ascii_case("&end")
}

impl Namelist {
    /// 解析 namelist 文本
    pub fn parse(text: &str) -> Result<Self, NamelistError> {
        let mut items = Vec::new();
        let mut current: Option<Group> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            match current.as_mut() {
                None => {
                    if let Some(rest) = trimmed.strip_prefix('&') {
                        let name = rest.split_whitespace().next().unwrap_or("").to_string();
                        current = Some(Group {
                            header: line.to_string(),
                            name,
                            lines: Vec::new(),
                            terminator: String::new(),
                        });
                    } else {
                        items.push(Item::Raw(line.to_string()));
                    }
                }
                Some(group) => {
                    if is_terminator(trimmed) {
                        group.terminator = line.to_string();
                        if let Some(done) = current.take() {
                            items.push(Item::Group(done));
                        }
                    } else if let Some(entry) = parse_entry(line) {
                        group.lines.push(Line::Entry(entry));
                    } else {
                        group.lines.push(Line::Raw(line.to_string()));
                    }
                }
            }
        }

        if let Some(group) = current {
            return Err(NamelistError::UnterminatedGroup { group: group.name });
        }

        Ok(Self {
            items,
            trailing_newline: text.ends_with('\n'),
        })
    }

    fn group_mut(&mut self, group: &str) -> Option<&mut Group> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Group(g) if g.name.eq_ignore_ascii_case(group) => Some(g),
            _ => None,
        })
    }

    fn group(&self, group: &str) -> Option<&Group> {
        self.items.iter().find_map(|item| match item {
            Item::Group(g) if g.name.eq_ignore_ascii_case(group) => Some(g),
            _ => None,
        })
    }

    /// 所有组名（按出现顺序）
    pub fn group_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Group(g) => Some(g.name.as_str()),
                Item::Raw(_) => None,
            })
            .collect()
    }

    /// 读取变量的原始值文本（组名和变量名大小写不敏感，取第一次出现）
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.group(group)?.lines.iter().find_map(|line| match line {
            Line::Entry(e) if e.key.eq_ignore_ascii_case(key) => Some(e.value.as_str()),
            _ => None,
        })
    }

    /// 读取实数变量
    pub fn get_real(&self, group: &str, key: &str) -> Result<f64, NamelistError> {
        let raw = self.get(group, key).ok_or_else(|| NamelistError::MissingKey {
            group: group.to_string(),
            key: key.to_string(),
        })?;
        parse_fortran_real(raw).ok_or_else(|| NamelistError::BadValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    /// 设置变量值
    ///
    /// 只替换组内第一个匹配的赋值行。没有匹配时不做任何修改并返回 `false`。
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<NamelistValue>) -> bool {
        let value = value.into();
        if let NamelistValue::Str(s) = &value {
            if s.contains('\'') || s.contains('"') {
                warn!("⚠️ 写入 {} 的字符串包含引号字符: {}", key, s);
            }
        }

        let Some(g) = self.group_mut(group) else {
            return false;
        };
        for line in g.lines.iter_mut() {
            if let Line::Entry(entry) = line {
                if entry.key.eq_ignore_ascii_case(key) {
                    entry.value = value.to_string();
                    return true;
                }
            }
        }
        false
    }

    /// 在组的结束符 `/` 之前追加原始行
    pub fn append_lines(&mut self, group: &str, text: &str) -> Result<(), NamelistError> {
        let g = self
            .group_mut(group)
            .ok_or_else(|| NamelistError::MissingGroup {
                group: group.to_string(),
            })?;
        for line in text.lines() {
            g.lines.push(Line::Raw(line.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for Namelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out: Vec<String> = Vec::new();
        for item in &self.items {
            match item {
                Item::Raw(line) => out.push(line.clone()),
                Item::Group(g) => {
                    out.push(g.header.clone());
                    for line in &g.lines {
                        match line {
                            Line::Raw(raw) => out.push(raw.clone()),
                            Line::Entry(entry) => out.push(entry.render()),
                        }
                    }
                    out.push(g.terminator.clone());
                }
            }
        }
        f.write_str(&out.join("\n"))?;
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Namelist {
    type Err = NamelistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namelist::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SFINCS_INPUT: &str = "! SFINCS input\n\
&general\n\
  RHSMode = 2 ! transport matrix\n\
/\n\
\n\
&geometryParameters\n\
  geometryScheme = 5\n\
  equilibriumFile = \"wout.nc\"\n\
  rN_wish = 0.5\n\
/\n\
&speciesParameters\n\
  Zs = 1 -1\n\
  mHats = 1 0.000545509\n\
  nHats = 1.0 1.0\n\
/\n\
&physicsParameters\n\
  Er = 0.0\n\
  Er = 99.0\n\
/\n";

    #[test]
    fn test_roundtrip_is_verbatim() {
        let nml = Namelist::parse(SFINCS_INPUT).unwrap();
        assert_eq!(nml.to_string(), SFINCS_INPUT);
        assert_eq!(
            nml.group_names(),
            vec![
                "general",
                "geometryParameters",
                "speciesParameters",
                "physicsParameters"
            ]
        );
    }

    #[test]
    fn test_set_is_case_insensitive_and_keeps_comment() {
        let mut nml = Namelist::parse(SFINCS_INPUT).unwrap();
        assert!(nml.set("GENERAL", "rhsmode", 3_i64));
        assert!(nml.to_string().contains("  RHSMode = 3 ! transport matrix\n"));
    }

    #[test]
    fn test_set_replaces_first_occurrence_only() {
        let mut nml = Namelist::parse(SFINCS_INPUT).unwrap();
        assert!(nml.set("physicsParameters", "Er", 15.0));
        let text = nml.to_string();
        assert!(text.contains("  Er = 15\n"));
        assert!(text.contains("  Er = 99.0\n"));
    }

    #[test]
    fn test_set_scoped_to_group() {
        let mut nml = Namelist::parse(SFINCS_INPUT).unwrap();
        // rN_wish 只存在于 geometryParameters
        assert!(!nml.set("speciesParameters", "rN_wish", 0.25));
        assert_eq!(nml.to_string(), SFINCS_INPUT);
    }

    #[test]
    fn test_set_without_match_is_noop() {
        let mut nml = Namelist::parse(SFINCS_INPUT).unwrap();
        assert!(!nml.set("speciesParameters", "THats", 2.0));
        assert!(!nml.set("missingGroup", "x", 1.0));
        assert_eq!(nml.to_string(), SFINCS_INPUT);
    }

    #[test]
    fn test_value_rendering() {
        let mut nml = Namelist::parse(SFINCS_INPUT).unwrap();
        nml.set("geometryParameters", "equilibriumFile", "/abs/wout_vmec.nc");
        nml.set("speciesParameters", "Zs", -1.0);
        nml.set("speciesParameters", "mHats", 5.446170214863400e-04);
        nml.set("speciesParameters", "nHats", vec![1.5, 2.0]);
        assert_eq!(
            nml.get("geometryParameters", "equilibriumFile"),
            Some("\"/abs/wout_vmec.nc\"")
        );
        assert_eq!(nml.get("speciesParameters", "Zs"), Some("-1"));
        assert_eq!(
            nml.get("speciesParameters", "mHats"),
            Some("0.00054461702148634")
        );
        assert_eq!(nml.get("speciesParameters", "nHats"), Some("1.5 2"));
        assert_eq!(NamelistValue::Bool(true).to_string(), ".true.");
        assert_eq!(NamelistValue::Real(1e-7).to_string(), "1e-7");
    }

    #[test]
    fn test_get_real_with_fortran_exponent() {
        let nml = Namelist::parse("&INDATA\n  PHIEDGE = 1.5D-01\n/\n").unwrap();
        assert_eq!(nml.get_real("indata", "phiedge").unwrap(), 0.15);
        assert!(matches!(
            nml.get_real("indata", "curtor"),
            Err(NamelistError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_append_lines_before_terminator() {
        let mut nml = Namelist::parse("&INDATA\n  NFP = 4\n/\n").unwrap();
        nml.append_lines("INDATA", "  RBC(0,0) = 1.0\n  ZBS(1,0) = 0.1")
            .unwrap();
        assert_eq!(
            nml.to_string(),
            "&INDATA\n  NFP = 4\n  RBC(0,0) = 1.0\n  ZBS(1,0) = 0.1\n/\n"
        );
        assert!(nml.append_lines("OTHER", "x").is_err());
    }

    #[test]
    fn test_unterminated_group_is_error() {
        assert!(matches!(
            Namelist::parse("&general\n  a = 1\n"),
            Err(NamelistError::UnterminatedGroup { .. })
        ));
    }

    #[test]
    fn test_comment_inside_quotes_is_not_comment() {
        let nml = Namelist::parse("&g\n  f = \"a!b\" ! real comment\n/").unwrap();
        assert_eq!(nml.get("g", "f"), Some("\"a!b\""));
        assert_eq!(nml.to_string(), "&g\n  f = \"a!b\" ! real comment\n/");
    }
}
