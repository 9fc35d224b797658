use crate::error::{FormulaError, FormulaResult};
use crate::field::ValueType;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata for one callable formula function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Declared casing. Filled from the catalog key when absent in JSON.
    #[serde(default)]
    pub name: String,
    pub min_args: Option<usize>,
    pub max_args: Option<usize>,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    pub return_type: ValueType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl FunctionSpec {
    pub fn new(
        name: impl Into<String>,
        min_args: Option<usize>,
        max_args: Option<usize>,
        arguments: &[ValueType],
        return_type: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            min_args,
            max_args,
            arguments: arguments
                .iter()
                .map(|&value_type| ArgumentSpec { value_type })
                .collect(),
            return_type,
        }
    }

    /// Expected type of the argument at `index`. Positions past the declared
    /// list reuse the last declared type, so a trailing argument is variadic.
    pub fn expected_argument(&self, index: usize) -> ValueType {
        self.arguments
            .get(index)
            .or_else(|| self.arguments.last())
            .map_or(ValueType::Any, |argument| argument.value_type)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    function_categories: BTreeMap<String, Vec<String>>,
    functions: BTreeMap<String, FunctionSpec>,
}

/// Immutable table of the functions a formula may call.
///
/// Lookups are case-insensitive. Categories only group functions for display
/// and play no part in validation.
#[derive(Clone, Debug, Default)]
pub struct FunctionCatalog {
    functions: HashMap<String, FunctionSpec>,
    categories: BTreeMap<String, Vec<String>>,
}

// The JSON is compiled in and checked by `bundled_catalog_loads`.
static BUNDLED: Lazy<FunctionCatalog> = Lazy::new(|| {
    FunctionCatalog::from_json(include_str!("functions.json"))
        .expect("bundled function catalog is valid")
});

impl FunctionCatalog {
    pub fn new(specs: impl IntoIterator<Item = FunctionSpec>) -> Self {
        let functions = specs
            .into_iter()
            .map(|spec| (spec.name.to_uppercase(), spec))
            .collect();
        Self {
            functions,
            categories: BTreeMap::new(),
        }
    }

    /// The catalog shipped with the crate, built on first use.
    pub fn bundled() -> &'static FunctionCatalog {
        &BUNDLED
    }

    /// Loads a catalog shaped `{ functionCategories: {..}, functions: {..} }`.
    pub fn from_json(json: &str) -> FormulaResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;

        let mut functions = HashMap::with_capacity(file.functions.len());
        for (key, mut spec) in file.functions {
            if spec.name.is_empty() {
                spec.name = key;
            }
            if let (Some(min), Some(max)) = (spec.min_args, spec.max_args) {
                if min > max {
                    return Err(FormulaError::Catalog(format!(
                        "{} has minArgs {min} greater than maxArgs {max}",
                        spec.name
                    )));
                }
            }
            functions.insert(spec.name.to_uppercase(), spec);
        }

        let mut catalog = Self {
            functions,
            categories: BTreeMap::new(),
        };
        for (category, names) in file.function_categories {
            catalog = catalog.with_category(category, names)?;
        }
        log::debug!(
            "loaded function catalog with {} functions in {} categories",
            catalog.functions.len(),
            catalog.categories.len()
        );
        Ok(catalog)
    }

    /// Adds a display category. Every name must already be in the catalog.
    pub fn with_category(
        mut self,
        category: impl Into<String>,
        names: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> FormulaResult<Self> {
        let category = category.into();
        let mut members = Vec::new();
        for name in names {
            let spec = self.lookup(name.as_ref()).ok_or_else(|| {
                FormulaError::Catalog(format!(
                    "category {category} lists unknown function {}",
                    name.as_ref()
                ))
            })?;
            members.push(spec.name.clone());
        }
        self.categories.insert(category, members);
        Ok(self)
    }

    /// Case-insensitive exact match.
    pub fn lookup(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(&name.to_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(category, names)| (category.as_str(), names.as_slice()))
    }

    pub fn functions_in(&self, category: &str) -> impl Iterator<Item = &FunctionSpec> {
        self.categories
            .get(category)
            .into_iter()
            .flatten()
            .filter_map(|name| self.lookup(name))
    }
}
