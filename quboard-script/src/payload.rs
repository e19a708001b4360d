//! Optimization payload wire types
//!
//! A payload declares decision variables, comparison constraints over them,
//! an objective expression and a return expression that maps a solved
//! assignment back to a board position. Serialized field names follow the
//! solver's wire format (`variables`, `Constraints`, `Objective`, `Return`).

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationPayload {
    pub variables: Variables,
    #[serde(rename = "Constraints", default)]
    pub constraints: Vec<Constraint>,
    #[serde(rename = "Objective")]
    pub objective: String,
    #[serde(rename = "Return")]
    pub return_expression: String,
}

impl OptimizationPayload {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ============================================================================
// VARIABLES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ElementType {
    #[default]
    Binary,
    Spin,
}

/// Array dimensions: a single length or a `[rows, cols]` pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Shape {
    Length(usize),
    Grid([usize; 2]),
}

impl Shape {
    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Length(n) => *n == 0,
            Shape::Grid([rows, cols]) => *rows == 0 || *cols == 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VariableKind {
    Binary,
    Spin,
    /// Integer in `lower..=upper`, one-hot encoded by the solver
    Unary { lower: i64, upper: i64 },
    Array {
        shape: Shape,
        #[serde(default)]
        vartype: ElementType,
    },
}

/// Most expression names a payload may declare across all its variables
pub const MAX_DECLARED_NAMES: u64 = 100_000;

impl VariableKind {
    /// Names this variable expands to, or `None` if the count overflows
    pub fn name_count(&self) -> Option<u64> {
        match self {
            VariableKind::Binary | VariableKind::Spin => Some(1),
            VariableKind::Unary { lower, upper } => {
                let span = (*upper as i128) - (*lower as i128) + 1;
                u64::try_from(span.max(0)).ok()?.checked_add(1)
            }
            VariableKind::Array { shape: Shape::Length(n), .. } => u64::try_from(*n).ok(),
            VariableKind::Array { shape: Shape::Grid([rows, cols]), .. } => {
                u64::try_from(*rows).ok()?.checked_mul(u64::try_from(*cols).ok()?)
            }
        }
    }

    /// Names an expression may reference for a variable called `name`
    ///
    /// Expansion stops after `MAX_DECLARED_NAMES` names.
    pub fn declared_names(&self, name: &str) -> Vec<String> {
        match self {
            VariableKind::Binary | VariableKind::Spin => vec![name.to_string()],
            VariableKind::Unary { .. } => {
                let members = self.name_count().unwrap_or(u64::MAX).saturating_sub(1);
                let members = members.min(MAX_DECLARED_NAMES - 1);
                let mut names = vec![name.to_string()];
                names.extend((0..members).map(|i| format!("{}[{}]", name, i)));
                names
            }
            VariableKind::Array { .. } => self.selectors(name),
        }
    }

    /// Binary-like members used when synthesizing an exactly-one constraint
    pub fn selectors(&self, name: &str) -> Vec<String> {
        let cap = MAX_DECLARED_NAMES as usize;
        match self {
            VariableKind::Array { shape: Shape::Length(n), .. } => {
                (0..*n).take(cap).map(|i| format!("{}_{}", name, i)).collect()
            }
            VariableKind::Array { shape: Shape::Grid([rows, cols]), .. } => (0..*rows)
                .flat_map(|r| (0..*cols).map(move |c| format!("{}_{}_{}", name, r, c)))
                .take(cap)
                .collect(),
            _ => vec![name.to_string()],
        }
    }
}

/// Declared variables in declaration order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(pub Vec<(String, VariableKind)>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VariableKind> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, k)| k)
    }

    /// Insert or replace, keeping the first declaration's position
    pub fn insert(&mut self, name: String, kind: VariableKind) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = kind,
            None => self.0.push((name, kind)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, VariableKind)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// Every name referable from an expression
    pub fn declared_names(&self) -> Vec<String> {
        self.0.iter().flat_map(|(n, k)| k.declared_names(n)).collect()
    }

    /// Total expanded name count, `None` on overflow
    pub fn name_count(&self) -> Option<u64> {
        self.0
            .iter()
            .try_fold(0u64, |total, (_, kind)| total.checked_add(kind.name_count()?))
    }
}

impl FromIterator<(String, VariableKind)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, VariableKind)>>(iter: I) -> Self {
        let mut vars = Variables::new();
        for (name, kind) in iter {
            vars.insert(name, kind);
        }
        vars
    }
}

impl Serialize for Variables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, kind) in &self.0 {
            map.serialize_entry(name, kind)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VariablesVisitor;

        impl<'de> Visitor<'de> for VariablesVisitor {
            type Value = Variables;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of variable name to descriptor")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Variables, A::Error> {
                let mut vars = Variables::new();
                while let Some((name, kind)) = access.next_entry::<String, VariableKind>()? {
                    vars.insert(name, kind);
                }
                Ok(vars)
            }
        }

        deserializer.deserialize_map(VariablesVisitor)
    }
}

// ============================================================================
// CONSTRAINTS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Comparator {
    #[default]
    Eq,
    Le,
    Ge,
    Ne,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
            Comparator::Ne => "!=",
        }
    }

    /// Accepts the canonical spellings plus `==` and the typographic forms
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "=" | "==" => Some(Comparator::Eq),
            "<=" | "≤" => Some(Comparator::Le),
            ">=" | "≥" => Some(Comparator::Ge),
            "!=" | "≠" => Some(Comparator::Ne),
            _ => None,
        }
    }

    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Eq => lhs == rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Comparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Comparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Comparator::parse(&text)
            .ok_or_else(|| de::Error::custom(format!("unknown comparison '{}'", text)))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub lhs: String,
    #[serde(default)]
    pub comparison: Comparator,
    #[serde(serialize_with = "serialize_rhs")]
    pub rhs: f64,
}

impl Constraint {
    pub fn new(lhs: impl Into<String>, comparison: Comparator, rhs: f64) -> Self {
        Self {
            lhs: lhs.into(),
            comparison,
            rhs,
        }
    }
}

fn serialize_rhs<S: Serializer>(rhs: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if rhs.fract() == 0.0 && rhs.abs() < 9.0e15 {
        serializer.serialize_i64(*rhs as i64)
    } else {
        serializer.serialize_f64(*rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> OptimizationPayload {
        OptimizationPayload {
            variables: vec![
                ("x4".to_string(), VariableKind::Binary),
                ("x0".to_string(), VariableKind::Binary),
            ]
            .into_iter()
            .collect(),
            constraints: vec![Constraint::new("x4 + x0", Comparator::Eq, 1.0)],
            objective: "-3 * x4".into(),
            return_expression: "4 * x4 + 0 * x0".into(),
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = sample().to_json();
        assert_eq!(json["Constraints"][0]["rhs"], json!(1));
        assert_eq!(json["Constraints"][0]["comparison"], json!("="));
        assert_eq!(json["Return"], json!("4 * x4 + 0 * x0"));
        assert_eq!(json["variables"]["x4"], json!({"type": "Binary"}));
    }

    #[test]
    fn test_variable_order_survives_text_roundtrip() {
        let text = serde_json::to_string(&sample()).unwrap();
        assert!(text.find("\"x4\"").unwrap() < text.find("\"x0\"").unwrap());
        let back: OptimizationPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(back.variables.names().collect::<Vec<_>>(), vec!["x4", "x0"]);
    }

    #[test]
    fn test_variable_kinds_parse() {
        let unary: VariableKind =
            serde_json::from_value(json!({"type": "Unary", "lower": 0, "upper": 2})).unwrap();
        assert_eq!(unary.declared_names("len"), vec!["len", "len[0]", "len[1]", "len[2]"]);
        let grid: VariableKind =
            serde_json::from_value(json!({"type": "Array", "shape": [2, 2]})).unwrap();
        assert_eq!(grid.selectors("g"), vec!["g_0_0", "g_0_1", "g_1_0", "g_1_1"]);
        let spins = json!({"type": "Array", "shape": 3, "vartype": "Spin"});
        let spins: VariableKind = serde_json::from_value(spins).unwrap();
        let expected = VariableKind::Array {
            shape: Shape::Length(3),
            vartype: ElementType::Spin,
        };
        assert_eq!(spins, expected);
        let sized: VariableKind =
            serde_json::from_value(json!({"type": "Binary", "size": 10})).unwrap();
        assert_eq!(sized, VariableKind::Binary);
    }

    #[test]
    fn test_name_count_survives_extreme_bounds() {
        let wide = VariableKind::Unary {
            lower: i64::MIN,
            upper: i64::MAX,
        };
        assert_eq!(wide.name_count(), None);
        assert_eq!(wide.declared_names("w").len(), MAX_DECLARED_NAMES as usize);
        let inverted = VariableKind::Unary { lower: 5, upper: 1 };
        assert_eq!(inverted.name_count(), Some(1));
        let grid = VariableKind::Array {
            shape: Shape::Grid([usize::MAX, 2]),
            vartype: ElementType::Binary,
        };
        assert_eq!(grid.name_count(), None);
        assert_eq!(grid.selectors("g").len(), MAX_DECLARED_NAMES as usize);
    }

    #[test]
    fn test_comparator_aliases() {
        let c: Comparator = serde_json::from_value(json!("≤")).unwrap();
        assert_eq!(c, Comparator::Le);
        assert_eq!(Comparator::parse("=="), Some(Comparator::Eq));
        assert!(serde_json::from_value::<Comparator>(json!("<>")).is_err());
        assert!(Comparator::Ne.holds(1.0, 2.0));
    }
}
