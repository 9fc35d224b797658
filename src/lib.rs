//! Formula parser and validator for form calculation fields.
//!
//! A formula has two equivalent forms: the raw text that gets persisted
//! (`ROUND({price}*{qty},2)`) and a flat list of [`Part`]s used while
//! editing. [`parse`] goes from text to parts, [`to_raw`] goes back, and
//! [`validate`] checks parts against the form's fields and a
//! [`FunctionCatalog`] without ever failing: problems come back as a
//! [`Report`] of [`Issue`]s.
//!
//! # Example
//!
//! ```rust
//! use formcalc::*;
//!
//! let fields = [
//!     FieldDescriptor::new("price", "Price", "currency"),
//!     FieldDescriptor::new("qty", "Quantity", "number"),
//! ];
//! let catalog = FunctionCatalog::bundled();
//!
//! let parts = parse("round({price} {qty}, 2)", &fields, catalog).unwrap();
//! assert_eq!(to_raw(&parts), "ROUND({price}+{qty},2)");
//!
//! let report = validate(&parts, &fields, catalog);
//! assert!(report.is_valid());
//!
//! let report = validate(&parse("SQRT()", &fields, catalog).unwrap(), &fields, catalog);
//! assert_eq!(
//!     report.error_messages(),
//!     vec!["SQRT requires at least 1 arguments, got 0"]
//! );
//! ```

mod catalog;
mod error;
mod field;
mod formula;
mod parse;
mod part;
mod session;
mod validate;

/// Uses the [`pest`] parsing expression grammar language.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use catalog::*;
pub use error::*;
pub use field::{value_type_of, FieldDescriptor, ValueType};
pub use formula::*;
pub use parse::{parse, tokenize, ParseError, Residue, Tokenized};
pub use part::*;
pub use session::*;
pub use validate::*;
