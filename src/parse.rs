use crate::catalog::FunctionCatalog;
use crate::field::{find_field, FieldDescriptor};
use crate::part::{Operator, Part};

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
struct FormulaParser;

pub type ParseError = pest::error::Error<Rule>;

/// A run of non-whitespace text the tokenizer dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Residue {
    /// Character offset into the input.
    pub offset: usize,
    pub text: String,
}

/// Output of [`tokenize`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub parts: Vec<Part>,
    pub residue: Vec<Residue>,
}

/// Parse raw formula text into parts.
///
/// Unrecognized characters are dropped silently; use [`tokenize`] to find out
/// what was dropped.
pub fn parse(
    text: &str,
    fields: &[FieldDescriptor],
    catalog: &FunctionCatalog,
) -> Result<Vec<Part>, ParseError> {
    Ok(tokenize(text, fields, catalog)?.parts)
}

/// Parse raw formula text into parts, keeping track of dropped text.
///
/// Field labels come from `fields`, falling back to the id when the field is
/// unknown. Identifiers directly followed by `(` become functions, in the
/// catalog's casing when the catalog knows them. A `+` is inserted between a
/// value and a directly following value or `(`.
pub fn tokenize(
    text: &str,
    fields: &[FieldDescriptor],
    catalog: &FunctionCatalog,
) -> Result<Tokenized, ParseError> {
    let mut tokenized = Tokenized::default();
    if text.trim().is_empty() {
        return Ok(tokenized);
    }

    let Some(formula) = FormulaParser::parse(Rule::formula, text)?.next() else {
        return Ok(tokenized);
    };

    // Byte offset just past the last dropped character, for merging runs.
    let mut residue_end = None;
    for pair in formula.into_inner() {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        let span = pair.as_span();
        match classify(pair, fields, catalog) {
            Some(part) => push_part(&mut tokenized.parts, part),
            None => {
                let continues_run = residue_end == Some(span.start());
                match tokenized.residue.last_mut() {
                    Some(last) if continues_run => last.text.push_str(span.as_str()),
                    _ => tokenized.residue.push(Residue {
                        offset: text[..span.start()].chars().count(),
                        text: span.as_str().to_string(),
                    }),
                }
                residue_end = Some(span.end());
            }
        }
    }

    log::debug!(
        "tokenized {} parts ({} dropped runs) from {text:?}",
        tokenized.parts.len(),
        tokenized.residue.len()
    );
    Ok(tokenized)
}

fn classify(pair: Pair<Rule>, fields: &[FieldDescriptor], catalog: &FunctionCatalog) -> Option<Part> {
    match pair.as_rule() {
        Rule::field => {
            let id = pair.into_inner().next()?.as_str();
            let label = find_field(fields, id).map_or(id, |field| field.label.as_str());
            Some(Part::field(id, label))
        }
        Rule::function => {
            let name = pair.as_str();
            let name = catalog.lookup(name).map_or(name, |spec| spec.name.as_str());
            Some(Part::function(name))
        }
        Rule::string => Some(Part::string(pair.as_str())),
        Rule::number => {
            let literal = pair.as_str();
            literal
                .parse::<f64>()
                .is_ok_and(f64::is_finite)
                .then(|| Part::number(literal))
        }
        Rule::operator => pair
            .as_str()
            .chars()
            .next()
            .and_then(Operator::from_char)
            .map(Part::operator),
        Rule::lparen => Some(Part::open()),
        Rule::rparen => Some(Part::close()),
        Rule::comma => Some(Part::Comma),
        _ => None,
    }
}

/// Append `part`, inserting the `+` that parsing the rendered text would.
pub(crate) fn push_part(parts: &mut Vec<Part>, part: Part) {
    if parts.last().is_some_and(Part::ends_value) && part.starts_value() {
        parts.push(Part::operator(Operator::Add));
    }
    parts.push(part);
}
