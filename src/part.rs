use serde::{Deserialize, Serialize};
use std::fmt;

/// One classified token of a formula.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    /// Reference to a form field. `label` is for display only.
    Field { id: String, label: String },
    /// Function name, without the trailing `(`.
    Function { value: String },
    /// Quoted literal, quotes included.
    String { value: String },
    /// Numeric literal kept as typed.
    Number { value: String },
    Operator { value: Operator },
    Parenthesis { value: Paren },
    Comma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Paren {
    #[serde(rename = "(")]
    Open,
    #[serde(rename = ")")]
    Close,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Subtract),
            '*' => Some(Self::Multiply),
            '/' => Some(Self::Divide),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Multiply => '*',
            Self::Divide => '/',
        }
    }
}

impl Paren {
    pub fn as_char(self) -> char {
        match self {
            Self::Open => '(',
            Self::Close => ')',
        }
    }
}

impl Part {
    pub fn field(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Field {
            id: id.into(),
            label: label.into(),
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::Function { value: name.into() }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String {
            value: value.into(),
        }
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self::Number {
            value: value.into(),
        }
    }

    pub fn operator(value: Operator) -> Self {
        Self::Operator { value }
    }

    pub fn open() -> Self {
        Self::Parenthesis { value: Paren::Open }
    }

    pub fn close() -> Self {
        Self::Parenthesis { value: Paren::Close }
    }

    /// True for parts after which a value has just ended: fields, literals
    /// and `)`.
    pub fn ends_value(&self) -> bool {
        matches!(
            self,
            Self::Field { .. }
                | Self::Number { .. }
                | Self::String { .. }
                | Self::Parenthesis { value: Paren::Close }
        )
    }

    /// True for parts that begin a new value: fields, literals and `(`.
    pub fn starts_value(&self) -> bool {
        matches!(
            self,
            Self::Field { .. }
                | Self::Number { .. }
                | Self::String { .. }
                | Self::Parenthesis { value: Paren::Open }
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Parenthesis { value: Paren::Open })
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::Parenthesis { value: Paren::Close })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl fmt::Display for Paren {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Renders a part in its canonical raw form.
impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { id, .. } => write!(f, "{{{id}}}"),
            Self::Function { value } | Self::String { value } | Self::Number { value } => {
                f.write_str(value)
            }
            Self::Operator { value } => write!(f, "{value}"),
            Self::Parenthesis { value } => write!(f, "{value}"),
            Self::Comma => f.write_str(","),
        }
    }
}

/// Converts parts back into the canonical, whitespace-free raw formula.
///
/// A function renders as its bare name; the `(` part that follows it renders
/// on its own, so the pair reads `NAME(`.
pub fn to_raw(parts: &[Part]) -> String {
    use fmt::Write;

    let mut raw = String::new();
    for part in parts {
        // Writing into a String cannot fail.
        let _ = write!(raw, "{part}");
    }
    raw
}
