use crate::catalog::FunctionCatalog;
use crate::error::{FormulaError, FormulaResult};
use crate::field::{find_field, FieldDescriptor};
use crate::formula::{Formula, FormulaOptions, FormulaPatch};
use crate::parse::{tokenize, Residue};
use crate::part::{Operator, Paren, Part};
use crate::validate::{residue_issues, validate, Report};

/// Where an editing session stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Editing,
    Validating,
    Saved,
    RejectedWithErrors,
}

/// Receives the formula of a calculation field once it passes validation.
pub trait FieldUpdater {
    fn update_field(&mut self, field_id: &str, patch: FormulaPatch);
}

impl<F> FieldUpdater for F
where
    F: FnMut(&str, FormulaPatch),
{
    fn update_field(&mut self, field_id: &str, patch: FormulaPatch) {
        self(field_id, patch)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(FormulaPatch),
    Rejected(Report),
}

/// Editing state for one calculation field.
///
/// Builder actions edit the parts directly. Free text typed into the formula
/// box is held aside and only parsed on [`Session::blur`] or
/// [`Session::save`].
pub struct Session<'a> {
    field_id: String,
    fields: &'a [FieldDescriptor],
    catalog: &'a FunctionCatalog,
    formula: Formula,
    pending_text: Option<String>,
    residue: Vec<Residue>,
    state: SessionState,
    last_report: Option<Report>,
}

impl<'a> Session<'a> {
    pub fn new(
        field_id: impl Into<String>,
        fields: &'a [FieldDescriptor],
        catalog: &'a FunctionCatalog,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            fields,
            catalog,
            formula: Formula::default(),
            pending_text: None,
            residue: Vec::new(),
            state: SessionState::Idle,
            last_report: None,
        }
    }

    /// Resume editing a persisted formula.
    pub fn open(
        field_id: impl Into<String>,
        raw: &str,
        options: FormulaOptions,
        fields: &'a [FieldDescriptor],
        catalog: &'a FunctionCatalog,
    ) -> FormulaResult<Self> {
        let mut session = Self::new(field_id, fields, catalog);
        let tokenized = tokenize(raw, fields, catalog)?;
        session.formula.set_parts(tokenized.parts);
        session.formula.set_options(options)?;
        session.residue = tokenized.residue;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn last_report(&self) -> Option<&Report> {
        self.last_report.as_ref()
    }

    /// What the formula box shows: uncommitted text, or the raw formula.
    pub fn text(&self) -> &str {
        self.pending_text.as_deref().unwrap_or(self.formula.raw())
    }

    pub fn add_field(&mut self, id: &str) -> FormulaResult<()> {
        if id.is_empty() || id.contains('}') {
            return Err(FormulaError::Literal(id.to_string()));
        }
        let label = find_field(self.fields, id).map_or(id, |field| field.label.as_str());
        let part = Part::field(id, label);
        self.edit(|formula| formula.push(part))
    }

    /// Appends the function together with its opening parenthesis.
    pub fn add_function(&mut self, name: &str) -> FormulaResult<()> {
        let parts = self.read_back(&format!("{name}("), 2)?;
        if !matches!(parts.first(), Some(Part::Function { .. })) {
            return Err(FormulaError::Literal(name.to_string()));
        }
        self.edit(|formula| parts.into_iter().for_each(|part| formula.push(part)))
    }

    pub fn add_operator(&mut self, operator: Operator) -> FormulaResult<()> {
        self.edit(|formula| formula.push(Part::operator(operator)))
    }

    /// Appends a number literal. Only `digits` or `digits.digits` are
    /// accepted, so the literal reads back unchanged from the raw text.
    pub fn add_number(&mut self, literal: &str) -> FormulaResult<()> {
        let mut parts = self.read_back(literal, 1)?;
        let part = match parts.pop() {
            Some(part @ Part::Number { .. }) => part,
            _ => return Err(FormulaError::Literal(literal.trim().to_string())),
        };
        self.edit(|formula| formula.push(part))
    }

    /// Appends a text literal, quoted with whichever quote it does not
    /// contain.
    pub fn add_string(&mut self, text: &str) -> FormulaResult<()> {
        let quoted = if !text.contains('"') {
            format!("\"{text}\"")
        } else if !text.contains('\'') {
            format!("'{text}'")
        } else {
            return Err(FormulaError::Literal(text.to_string()));
        };
        self.edit(|formula| formula.push(Part::string(quoted)))
    }

    pub fn add_parenthesis(&mut self, paren: Paren) -> FormulaResult<()> {
        self.edit(|formula| formula.push(Part::Parenthesis { value: paren }))
    }

    pub fn add_comma(&mut self) -> FormulaResult<()> {
        self.edit(|formula| formula.push(Part::Comma))
    }

    /// Removes the last part. A function goes together with its `(`.
    pub fn backspace(&mut self) -> FormulaResult<()> {
        self.edit(|formula| {
            formula.edit_parts(|parts| {
                if parts.pop().is_some_and(|part| part.is_open())
                    && matches!(parts.last(), Some(Part::Function { .. }))
                {
                    parts.pop();
                }
            })
        })
    }

    /// Replace the formula text as typed. Parsed on blur or save.
    pub fn edit_text(&mut self, text: impl Into<String>) {
        self.pending_text = Some(text.into());
        self.transition(SessionState::Editing);
    }

    pub fn set_decimal_places(&mut self, decimal_places: u8) -> FormulaResult<()> {
        self.formula.set_decimal_places(decimal_places)?;
        self.transition(SessionState::Editing);
        Ok(())
    }

    pub fn set_ignore_hidden_fields(&mut self, ignore_hidden_fields: bool) {
        self.formula.set_ignore_hidden_fields(ignore_hidden_fields);
        self.transition(SessionState::Editing);
    }

    pub fn set_read_only(&mut self, is_read_only: bool) {
        self.formula.set_read_only(is_read_only);
        self.transition(SessionState::Editing);
    }

    /// Commit typed text and validate without saving.
    pub fn blur(&mut self) -> FormulaResult<Report> {
        let report = self.check()?;
        if report.is_valid() {
            self.transition(SessionState::Editing);
        } else {
            self.reject(&report);
        }
        Ok(report)
    }

    /// Validate and, if there are no errors, hand the formula to `updater`.
    pub fn save(&mut self, updater: &mut impl FieldUpdater) -> FormulaResult<SaveOutcome> {
        let report = self.check()?;
        if !report.is_valid() {
            self.reject(&report);
            return Ok(SaveOutcome::Rejected(report));
        }

        let patch = self.formula.patch();
        updater.update_field(&self.field_id, patch.clone());
        log::info!(
            "saved formula for field {}: {:?} ({} warnings)",
            self.field_id,
            patch.formula,
            report.warnings.len()
        );
        self.transition(SessionState::Saved);
        self.transition(SessionState::Idle);
        Ok(SaveOutcome::Saved(patch))
    }

    fn edit(&mut self, action: impl FnOnce(&mut Formula)) -> FormulaResult<()> {
        self.commit_text()?;
        action(&mut self.formula);
        self.transition(SessionState::Editing);
        Ok(())
    }

    /// Tokenizes builder input, which must come back as exactly `expected`
    /// parts with nothing dropped.
    fn read_back(&self, text: &str, expected: usize) -> FormulaResult<Vec<Part>> {
        let tokenized = tokenize(text, self.fields, self.catalog)?;
        if tokenized.parts.len() != expected || !tokenized.residue.is_empty() {
            return Err(FormulaError::Literal(text.trim().to_string()));
        }
        Ok(tokenized.parts)
    }

    fn commit_text(&mut self) -> FormulaResult<()> {
        if let Some(text) = self.pending_text.take() {
            let tokenized = tokenize(&text, self.fields, self.catalog)?;
            self.formula.set_parts(tokenized.parts);
            self.residue = tokenized.residue;
        }
        Ok(())
    }

    fn check(&mut self) -> FormulaResult<Report> {
        self.commit_text()?;
        self.transition(SessionState::Validating);
        let mut report = validate(self.formula.parts(), self.fields, self.catalog);
        let mut errors = residue_issues(&self.residue);
        errors.append(&mut report.errors);
        report.errors = errors;
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn reject(&mut self, report: &Report) {
        if report.requires_reset() {
            log::warn!(
                "clearing formula for field {} after unrecoverable errors: {:?}",
                self.field_id,
                report.error_messages()
            );
            self.formula.clear();
            self.residue.clear();
        }
        self.transition(SessionState::RejectedWithErrors);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("field {}: {:?} -> {:?}", self.field_id, self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Issue;
    use pretty_assertions::assert_eq;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("price", "Price", "currency"),
            FieldDescriptor::new("qty", "Quantity", "number"),
            FieldDescriptor::new("name", "Name", "shorttext"),
        ]
    }

    fn save(session: &mut Session) -> (SaveOutcome, Vec<(String, FormulaPatch)>) {
        let mut calls = Vec::new();
        let outcome = session
            .save(&mut |id: &str, patch: FormulaPatch| calls.push((id.to_string(), patch)))
            .unwrap();
        (outcome, calls)
    }

    #[test]
    fn builder_actions_save() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        assert_eq!(session.state(), SessionState::Idle);

        session.add_function("round").unwrap();
        session.add_field("price").unwrap();
        session.add_operator(Operator::Multiply).unwrap();
        session.add_field("qty").unwrap();
        session.add_comma().unwrap();
        session.add_number("2").unwrap();
        session.add_parenthesis(Paren::Close).unwrap();
        session.set_decimal_places(3).unwrap();
        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(session.text(), "ROUND({price}*{qty},2)");

        let (outcome, calls) = save(&mut session);
        let expected = FormulaPatch {
            formula: "ROUND({price}*{qty},2)".to_string(),
            field_references: vec!["price".to_string(), "qty".to_string()],
            decimal_places: 3,
            ignore_hidden_fields: false,
            is_read_only: false,
        };
        assert_eq!(outcome, SaveOutcome::Saved(expected.clone()));
        assert_eq!(calls, vec![("total".to_string(), expected)]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn errors_block_save() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session.add_field("qty").unwrap();
        session.add_operator(Operator::Subtract).unwrap();

        let (outcome, calls) = save(&mut session);
        assert!(matches!(outcome, SaveOutcome::Rejected(ref report) if !report.is_valid()));
        assert!(calls.is_empty());
        assert_eq!(session.state(), SessionState::RejectedWithErrors);
        // Not a reset class: the formula stays for correction.
        assert_eq!(session.formula().raw(), "{qty}-");
    }

    #[test]
    fn unresolved_references_reset_formula() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session.edit_text("{deleted} + NOPE(1)");
        assert_eq!(session.text(), "{deleted} + NOPE(1)");

        let (outcome, calls) = save(&mut session);
        let SaveOutcome::Rejected(report) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(
            report.errors,
            vec![
                Issue::InvalidFieldReference {
                    id: "deleted".to_string()
                },
                Issue::UndefinedFunction {
                    name: "NOPE".to_string()
                },
            ]
        );
        assert!(calls.is_empty());
        assert!(session.formula().is_empty());
        assert_eq!(session.text(), "");
    }

    #[test]
    fn residue_is_reported_on_blur() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session.edit_text("{price} ^ 2");
        let report = session.blur().unwrap();
        assert_eq!(
            report.errors,
            vec![Issue::UnrecognizedText {
                offset: 8,
                text: "^".to_string()
            }]
        );
        assert_eq!(session.state(), SessionState::RejectedWithErrors);
        assert!(session.formula().is_empty());
        assert_eq!(session.last_report(), Some(&report));
    }

    #[test]
    fn valid_blur_keeps_editing() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session.edit_text("sum({price}, {qty})");
        let report = session.blur().unwrap();
        assert!(report.is_valid());
        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(session.text(), "SUM({price},{qty})");
    }

    #[test]
    fn warnings_do_not_block_save() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session
            .formula
            .set_parts(vec![Part::field("price", "Price"), Part::field("qty", "Quantity")]);

        let (outcome, calls) = save(&mut session);
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
        assert_eq!(calls.len(), 1);
        assert_eq!(session.last_report().unwrap().warnings.len(), 1);
    }

    #[test]
    fn builder_parts_match_their_raw() {
        let fields = fields();
        let catalog = FunctionCatalog::bundled();
        let mut session = Session::new("total", &fields, catalog);
        session.add_number("1").unwrap();
        session.add_number("2").unwrap();
        session.add_field("price").unwrap();
        session.add_parenthesis(Paren::Open).unwrap();
        session.add_number("3").unwrap();
        session.add_parenthesis(Paren::Close).unwrap();
        session.add_function("abs").unwrap();
        session.add_field("qty").unwrap();
        session.add_parenthesis(Paren::Close).unwrap();
        assert_eq!(session.text(), "1+2+{price}+(3)ABS({qty})");

        let formula = session.formula();
        assert_eq!(
            crate::parse::parse(formula.raw(), &fields, catalog).unwrap(),
            formula.parts().to_vec()
        );
        assert!(session.last_report().is_none());
    }

    #[test]
    fn number_literals_read_back_unchanged() {
        let fields = fields();
        let catalog = FunctionCatalog::bundled();
        let mut session = Session::new("total", &fields, catalog);
        for literal in [".5", "1.", "1.2.3", "", "1 2", "+1"] {
            assert!(
                matches!(session.add_number(literal), Err(FormulaError::Literal(_))),
                "{literal:?}"
            );
        }
        assert!(session.formula().is_empty());

        session.add_number("0.5").unwrap();
        let (outcome, _) = save(&mut session);
        let SaveOutcome::Saved(patch) = outcome else {
            panic!("expected save");
        };
        let mut reopened =
            Session::open("total", &patch.formula, FormulaOptions::default(), &fields, catalog)
                .unwrap();
        assert!(matches!(save(&mut reopened).0, SaveOutcome::Saved(_)));
        assert_eq!(reopened.text(), "0.5");
    }

    #[test]
    fn function_names_must_be_identifiers() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        assert!(session.add_function("my fn").is_err());
        assert!(session.add_function("1x").is_err());
        assert!(session.add_field("a}b").is_err());
        assert!(session.formula().is_empty());
    }

    #[test]
    fn backspace_removes_function_with_paren() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session.add_number("1").unwrap();
        session.add_operator(Operator::Add).unwrap();
        session.add_function("ABS").unwrap();
        assert_eq!(session.text(), "1+ABS(");

        session.backspace().unwrap();
        assert_eq!(session.text(), "1+");
        session.backspace().unwrap();
        session.backspace().unwrap();
        assert_eq!(session.text(), "");
        session.backspace().unwrap();
        assert_eq!(session.text(), "");
    }

    #[test]
    fn builder_action_commits_typed_text_first() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        session.edit_text("{price} *");
        session.add_field("qty").unwrap();
        assert_eq!(session.text(), "{price}*{qty}");
    }

    #[test]
    fn literals_are_checked() {
        let fields = fields();
        let mut session = Session::new("total", &fields, FunctionCatalog::bundled());
        assert!(matches!(
            session.add_number("1e5"),
            Err(FormulaError::Literal(_))
        ));
        assert!(session.add_number("-3").is_err());
        session.add_number(" 2.50 ").unwrap();
        session.add_operator(Operator::Add).unwrap();
        session.add_string("it's").unwrap();
        assert_eq!(session.text(), "2.50+\"it's\"");
        session.add_string("say \"hi\"").unwrap();
        assert!(session.add_string("both ' and \"").is_err());
    }

    #[test]
    fn open_persisted_formula() {
        let fields = fields();
        let options = FormulaOptions {
            decimal_places: 0,
            ignore_hidden_fields: true,
            is_read_only: true,
        };
        let mut session = Session::open(
            "total",
            "{name}+' x'",
            options,
            &fields,
            FunctionCatalog::bundled(),
        )
        .unwrap();
        assert_eq!(session.formula().parts().len(), 3);
        let (outcome, _) = save(&mut session);
        let SaveOutcome::Saved(patch) = outcome else {
            panic!("expected save");
        };
        assert_eq!(patch.field_references, vec!["name"]);
        assert!(patch.is_read_only && patch.ignore_hidden_fields);
        assert_eq!(patch.decimal_places, 0);
    }
}
