use crate::catalog::FunctionCatalog;
use crate::field::{find_field, FieldDescriptor, ValueType};
use crate::parse::Residue;
use crate::part::{to_raw, Operator, Part};

use thiserror::Error;

/// A problem found in a formula. Errors block saving, warnings do not.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Issue {
    #[error("Invalid field reference: {{{id}}}")]
    InvalidFieldReference { id: String },

    #[error("Field type cannot be used in calculations: {label} ({field_type})")]
    UnusableFieldType { label: String, field_type: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    #[error("Missing opening parenthesis after {function}")]
    MissingOpeningParenthesis { function: String },

    #[error("Missing closing parenthesis for {function}")]
    MissingClosingParenthesis { function: String },

    #[error("Unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("{function} requires at least {min} arguments, got {actual}")]
    TooFewArguments {
        function: String,
        min: usize,
        actual: usize,
    },

    #[error("{function} accepts at most {max} arguments, got {actual}")]
    TooManyArguments {
        function: String,
        max: usize,
        actual: usize,
    },

    #[error("Argument {index} of {function} is empty")]
    EmptyArgument { function: String, index: usize },

    #[error("Argument {index} of {function} must be {expected}, got {actual} ({value})")]
    ArgumentType {
        index: usize,
        function: String,
        expected: ValueType,
        actual: ValueType,
        value: String,
    },

    #[error("Operator '{operator}' is not supported with text fields, only '+' can join text")]
    TextOperator { operator: Operator },

    #[error("Consecutive operators '{first}' and '{second}'")]
    ConsecutiveOperators { first: Operator, second: Operator },

    #[error("Expression cannot start with operator '{operator}'")]
    LeadingOperator { operator: Operator },

    #[error("Expression cannot end with operator '{operator}'")]
    TrailingOperator { operator: Operator },

    #[error("Unexpected ',' outside of a function call")]
    UnexpectedComma,

    #[error("Unrecognized text '{text}' at position {offset}")]
    UnrecognizedText { offset: usize, text: String },

    #[error("Invalid syntax '{text}' at position {offset}, separate arguments with ','")]
    InvalidSyntax { offset: usize, text: String },

    #[error("Missing operator between {before} and {after}")]
    MissingOperator { before: String, after: String },
}

impl Issue {
    /// Issues that leave the formula pointing at something that does not
    /// resolve. The editor clears the formula instead of keeping it.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            Self::InvalidFieldReference { .. }
                | Self::UndefinedFunction { .. }
                | Self::UnrecognizedText { .. }
                | Self::InvalidSyntax { .. }
        )
    }
}

/// Accumulated validation output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl Report {
    /// No errors. Warnings never block a save.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn requires_reset(&self) -> bool {
        self.errors.iter().any(Issue::requires_reset)
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    fn error(&mut self, issue: Issue) {
        if !self.errors.contains(&issue) {
            self.errors.push(issue);
        }
    }

    fn warning(&mut self, issue: Issue) {
        if !self.warnings.contains(&issue) {
            self.warnings.push(issue);
        }
    }
}

/// Check a parsed formula against the declared fields and the function
/// catalog. Never mutates `parts`.
pub fn validate(parts: &[Part], fields: &[FieldDescriptor], catalog: &FunctionCatalog) -> Report {
    let mut validator = Validator {
        fields,
        catalog,
        report: Report::default(),
    };
    let result_type = validator.expression(parts);
    validator.check_text_operators(parts);
    validator.check_adjacency(parts);

    let report = validator.report;
    log::debug!(
        "validated {} parts as {result_type}: {} errors, {} warnings",
        parts.len(),
        report.errors.len(),
        report.warnings.len()
    );
    report
}

/// Turn text the tokenizer dropped into blocking issues. A bare `.` is taken
/// as an attempt to separate arguments.
pub fn residue_issues(residue: &[Residue]) -> Vec<Issue> {
    residue
        .iter()
        .map(|r| {
            if r.text.chars().all(|c| c == '.') {
                Issue::InvalidSyntax {
                    offset: r.offset,
                    text: r.text.clone(),
                }
            } else {
                Issue::UnrecognizedText {
                    offset: r.offset,
                    text: r.text.clone(),
                }
            }
        })
        .collect()
}

struct Validator<'a> {
    fields: &'a [FieldDescriptor],
    catalog: &'a FunctionCatalog,
    report: Report,
}

impl Validator<'_> {
    /// Type-checks one expression, descending into groups and function
    /// arguments.
    fn expression(&mut self, parts: &[Part]) -> ValueType {
        // There are no unary operators, `-3` is written `0-3`.
        if let Some(Part::Operator { value }) = parts.first() {
            self.report
                .error(Issue::LeadingOperator { operator: *value });
        }

        let mut operands = Vec::new();
        let mut arithmetic = false;

        let mut i = 0;
        while i < parts.len() {
            match &parts[i] {
                Part::Function { value } => {
                    let (value_type, next) = self.call(parts, i, value);
                    operands.push(value_type);
                    i = next;
                }
                Part::Parenthesis { .. } if parts[i].is_open() => {
                    let end = match matching_close(parts, i) {
                        Some(close) => close,
                        None => {
                            self.report.error(Issue::UnbalancedParentheses);
                            parts.len()
                        }
                    };
                    operands.push(self.expression(&parts[i + 1..end]));
                    i = end + 1;
                }
                Part::Parenthesis { .. } => {
                    self.report.error(Issue::UnbalancedParentheses);
                    i += 1;
                }
                Part::Operator { value } => {
                    arithmetic |= *value != Operator::Add;
                    i += 1;
                }
                Part::Comma => {
                    self.report.error(Issue::UnexpectedComma);
                    i += 1;
                }
                operand => {
                    operands.push(self.operand(operand));
                    i += 1;
                }
            }
        }

        if let Some(Part::Operator { value }) = parts.last() {
            self.report
                .error(Issue::TrailingOperator { operator: *value });
        }

        combine(&operands, arithmetic)
    }

    fn operand(&mut self, part: &Part) -> ValueType {
        match part {
            Part::Field { id, .. } => match find_field(self.fields, id) {
                None => {
                    self.report
                        .error(Issue::InvalidFieldReference { id: id.clone() });
                    ValueType::Any
                }
                Some(field) => field.value_type().unwrap_or_else(|| {
                    self.report.error(Issue::UnusableFieldType {
                        label: field.label.clone(),
                        field_type: field.field_type.clone(),
                    });
                    ValueType::Any
                }),
            },
            Part::Number { .. } => ValueType::Number,
            Part::String { .. } => ValueType::String,
            _ => ValueType::Any,
        }
    }

    /// Checks the call starting at `parts[at]`. Returns the call's type and the
    /// index just past its closing parenthesis.
    fn call(&mut self, parts: &[Part], at: usize, name: &str) -> (ValueType, usize) {
        let open = at + 1;
        let span = parts
            .get(open)
            .filter(|part| part.is_open())
            .map(|_| matching_close(parts, open));

        let catalog = self.catalog;
        let Some(spec) = catalog.lookup(name) else {
            self.report.error(Issue::UndefinedFunction {
                name: name.to_string(),
            });
            let next = match span {
                Some(Some(close)) => close + 1,
                Some(None) => parts.len(),
                None => open,
            };
            return (ValueType::Any, next);
        };

        let close = match span {
            Some(Some(close)) => close,
            Some(None) => {
                self.report.error(Issue::MissingClosingParenthesis {
                    function: spec.name.clone(),
                });
                parts.len()
            }
            None => {
                self.report.error(Issue::MissingOpeningParenthesis {
                    function: spec.name.clone(),
                });
                return (spec.return_type, open);
            }
        };

        let arguments = split_arguments(&parts[open + 1..close]);
        if let Some(min) = spec.min_args {
            if arguments.len() < min {
                self.report.error(Issue::TooFewArguments {
                    function: spec.name.clone(),
                    min,
                    actual: arguments.len(),
                });
            }
        }
        if let Some(max) = spec.max_args {
            if arguments.len() > max {
                self.report.error(Issue::TooManyArguments {
                    function: spec.name.clone(),
                    max,
                    actual: arguments.len(),
                });
            }
        }

        for (index, argument) in arguments.iter().enumerate() {
            if argument.is_empty() {
                self.report.error(Issue::EmptyArgument {
                    function: spec.name.clone(),
                    index: index + 1,
                });
                continue;
            }
            let actual = self.expression(argument);
            let expected = spec.expected_argument(index);
            if !expected.accepts(actual) {
                self.report.error(Issue::ArgumentType {
                    index: index + 1,
                    function: spec.name.clone(),
                    expected,
                    actual,
                    value: to_raw(argument),
                });
            }
        }

        (spec.return_type, close + 1)
    }

    /// Text fields only support concatenation.
    fn check_text_operators(&mut self, parts: &[Part]) {
        let has_text_field = parts.iter().any(|part| match part {
            Part::Field { id, .. } => find_field(self.fields, id)
                .and_then(FieldDescriptor::value_type)
                == Some(ValueType::String),
            _ => false,
        });
        if !has_text_field {
            return;
        }
        for part in parts {
            if let Part::Operator { value } = part {
                if *value != Operator::Add {
                    self.report.error(Issue::TextOperator { operator: *value });
                }
            }
        }
    }

    fn check_adjacency(&mut self, parts: &[Part]) {
        for pair in parts.windows(2) {
            let (before, after) = (&pair[0], &pair[1]);
            if let (Part::Operator { value: first }, Part::Operator { value: second }) =
                (before, after)
            {
                self.report.error(Issue::ConsecutiveOperators {
                    first: *first,
                    second: *second,
                });
            } else if before.ends_value() && after.starts_value() {
                self.report.warning(Issue::MissingOperator {
                    before: before.to_string(),
                    after: after.to_string(),
                });
            }
        }
    }
}

fn combine(operands: &[ValueType], arithmetic: bool) -> ValueType {
    match operands {
        [] => ValueType::Any,
        [single] => *single,
        _ if arithmetic => ValueType::Number,
        _ if operands.contains(&ValueType::String) => ValueType::String,
        _ if operands.iter().all(|&t| t == ValueType::Number) => ValueType::Number,
        _ => ValueType::Any,
    }
}

/// Index of the `)` balancing the `(` at `open`.
fn matching_close(parts: &[Part], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, part) in parts.iter().enumerate().skip(open) {
        if part.is_open() {
            depth += 1;
        } else if part.is_close() {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Split the inside of a call on top-level commas. No parts means no
/// arguments.
fn split_arguments(inner: &[Part]) -> Vec<&[Part]> {
    if inner.is_empty() {
        return Vec::new();
    }
    let mut arguments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, part) in inner.iter().enumerate() {
        match part {
            Part::Parenthesis { .. } if part.is_open() => depth += 1,
            Part::Parenthesis { .. } => depth = depth.saturating_sub(1),
            Part::Comma if depth == 0 => {
                arguments.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    arguments.push(&inner[start..]);
    arguments
}
