use crate::catalog::FunctionCatalog;
use crate::error::{FormulaError, FormulaResult};
use crate::field::FieldDescriptor;
use crate::parse::{parse, push_part, ParseError};
use crate::part::{to_raw, Part};

use serde::{Deserialize, Serialize};

pub const MAX_DECIMAL_PLACES: u8 = 10;

/// Formatting options stored next to the formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormulaOptions {
    pub decimal_places: u8,
    pub ignore_hidden_fields: bool,
    pub is_read_only: bool,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        Self {
            decimal_places: 2,
            ignore_hidden_fields: false,
            is_read_only: false,
        }
    }
}

impl FormulaOptions {
    pub fn from_json(json: &str) -> FormulaResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.check()?;
        Ok(options)
    }

    pub fn check(&self) -> FormulaResult<()> {
        if self.decimal_places > MAX_DECIMAL_PLACES {
            return Err(FormulaError::DecimalPlaces {
                max: MAX_DECIMAL_PLACES,
                actual: self.decimal_places,
            });
        }
        Ok(())
    }
}

/// The shape handed to the field store on save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaPatch {
    pub formula: String,
    pub field_references: Vec<String>,
    pub decimal_places: u8,
    pub ignore_hidden_fields: bool,
    pub is_read_only: bool,
}

/// A formula held in both of its forms.
///
/// `raw` is always the rendering of `parts`; every mutation of the parts goes
/// through this type so the two never drift apart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Formula {
    raw: String,
    parts: Vec<Part>,
    options: FormulaOptions,
}

impl Formula {
    pub fn new(options: FormulaOptions) -> FormulaResult<Self> {
        options.check()?;
        Ok(Self {
            options,
            ..Self::default()
        })
    }

    /// Parse `text` and store it in canonical form.
    pub fn parse(
        text: &str,
        fields: &[FieldDescriptor],
        catalog: &FunctionCatalog,
    ) -> Result<Self, ParseError> {
        let mut formula = Self::default();
        formula.set_parts(parse(text, fields, catalog)?);
        Ok(formula)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn options(&self) -> FormulaOptions {
        self.options
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn set_parts(&mut self, parts: Vec<Part>) {
        self.parts = parts;
        self.sync_raw();
    }

    /// Mutate the parts in place; `raw` is re-derived afterwards.
    pub fn edit_parts<T>(&mut self, edit: impl FnOnce(&mut Vec<Part>) -> T) -> T {
        let output = edit(&mut self.parts);
        self.sync_raw();
        output
    }

    /// Append a part. A value directly after a value gets a `+` in between,
    /// the same as when the raw text is parsed.
    pub fn push(&mut self, part: Part) {
        self.edit_parts(|parts| push_part(parts, part));
    }

    pub fn clear(&mut self) {
        self.set_parts(Vec::new());
    }

    pub fn set_options(&mut self, options: FormulaOptions) -> FormulaResult<()> {
        options.check()?;
        self.options = options;
        Ok(())
    }

    pub fn set_decimal_places(&mut self, decimal_places: u8) -> FormulaResult<()> {
        self.set_options(FormulaOptions {
            decimal_places,
            ..self.options
        })
    }

    pub fn set_ignore_hidden_fields(&mut self, ignore_hidden_fields: bool) {
        self.options.ignore_hidden_fields = ignore_hidden_fields;
    }

    pub fn set_read_only(&mut self, is_read_only: bool) {
        self.options.is_read_only = is_read_only;
    }

    /// Referenced field ids, deduplicated, in order of first appearance.
    pub fn field_references(&self) -> Vec<String> {
        let mut references: Vec<String> = Vec::new();
        for part in &self.parts {
            if let Part::Field { id, .. } = part {
                if !references.contains(id) {
                    references.push(id.clone());
                }
            }
        }
        references
    }

    pub fn patch(&self) -> FormulaPatch {
        FormulaPatch {
            formula: self.raw.clone(),
            field_references: self.field_references(),
            decimal_places: self.options.decimal_places,
            ignore_hidden_fields: self.options.ignore_hidden_fields,
            is_read_only: self.options.is_read_only,
        }
    }

    fn sync_raw(&mut self) {
        self.raw = to_raw(&self.parts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Operator;
    use pretty_assertions::assert_eq;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("a", "A", "number"),
            FieldDescriptor::new("b", "B", "number"),
        ]
    }

    #[test]
    fn parse_normalizes_raw() {
        let formula =
            Formula::parse(" {a}  {b} * 2 ", &fields(), FunctionCatalog::bundled()).unwrap();
        assert_eq!(formula.raw(), "{a}+{b}*2");
        assert_eq!(formula.parts().len(), 5);
    }

    #[test]
    fn edits_keep_raw_in_sync() {
        let mut formula = Formula::default();
        formula.push(Part::field("a", "A"));
        formula.push(Part::operator(Operator::Multiply));
        formula.push(Part::number("3"));
        assert_eq!(formula.raw(), "{a}*3");

        let removed = formula.edit_parts(|parts| parts.pop());
        assert_eq!(removed, Some(Part::number("3")));
        assert_eq!(formula.raw(), "{a}*");

        formula.clear();
        assert_eq!(formula.raw(), "");
        assert!(formula.is_empty());
    }

    #[test]
    fn pushed_values_are_joined_like_parsed_ones() {
        let fields = fields();
        let catalog = FunctionCatalog::bundled();
        let mut formula = Formula::default();
        formula.push(Part::number("1"));
        formula.push(Part::number("2"));
        formula.push(Part::field("a", "A"));
        formula.push(Part::open());
        formula.push(Part::number("3"));
        formula.push(Part::close());
        assert_eq!(formula.raw(), "1+2+{a}+(3)");
        assert_eq!(parse(formula.raw(), &fields, catalog).unwrap(), formula.parts().to_vec());
    }

    #[test]
    fn field_references_are_deduplicated_in_order() {
        let formula =
            Formula::parse("{b} + {a} * {b} + {a}", &fields(), FunctionCatalog::bundled()).unwrap();
        assert_eq!(formula.field_references(), vec!["b", "a"]);
    }

    #[test]
    fn decimal_places_are_bounded() {
        let mut formula = Formula::default();
        assert_eq!(formula.options().decimal_places, 2);
        formula.set_decimal_places(10).unwrap();
        assert!(matches!(
            formula.set_decimal_places(11),
            Err(FormulaError::DecimalPlaces {
                max: 10,
                actual: 11
            })
        ));
        assert_eq!(formula.options().decimal_places, 10);
        assert!(Formula::new(FormulaOptions {
            decimal_places: 42,
            ..FormulaOptions::default()
        })
        .is_err());
    }

    #[test]
    fn options_from_json() {
        let options = FormulaOptions::from_json(r#"{"decimalPlaces": 4, "isReadOnly": true}"#).unwrap();
        assert_eq!(
            options,
            FormulaOptions {
                decimal_places: 4,
                ignore_hidden_fields: false,
                is_read_only: true,
            }
        );
        assert!(FormulaOptions::from_json(r#"{"decimalPlaces": 12}"#).is_err());
        assert!(matches!(
            FormulaOptions::from_json("not json"),
            Err(FormulaError::Json(_))
        ));
    }

    #[test]
    fn patch_shape() {
        let mut formula =
            Formula::parse("ROUND({a} / {b}, 1)", &fields(), FunctionCatalog::bundled()).unwrap();
        formula.set_ignore_hidden_fields(true);
        let json = serde_json::to_value(formula.patch()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "formula": "ROUND({a}/{b},1)",
                "fieldReferences": ["a", "b"],
                "decimalPlaces": 2,
                "ignoreHiddenFields": true,
                "isReadOnly": false,
            })
        );
    }
}
