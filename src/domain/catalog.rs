//! Reference catalogs: the universe of categories an activity can map to.
//!
//! A catalog is immutable once built. Positions are the join key between the
//! retrieval shortlist, the model's structured answer and the final record.

use super::TaskKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A process-level impact factor row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactFactor {
    #[serde(rename = "impact_factor_id")]
    pub id: String,
    #[serde(rename = "impact_factor_name")]
    pub name: String,
    pub reference_product: String,
    #[serde(default)]
    pub product_info: String,
}

/// An industry sector row joined with its supply-chain emission factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaicsEntry {
    #[serde(rename = "naics_code")]
    pub code: String,
    #[serde(rename = "naics_title")]
    pub title: String,
    #[serde(rename = "naics_desc")]
    pub description: String,
    pub co2e_per_dollar: f64,
    pub bea_code: String,
}

#[derive(Debug, Clone)]
pub struct ProcessCatalog {
    factors: Vec<ImpactFactor>,
    products: Vec<String>,
}

impl ProcessCatalog {
    /// Build the catalog, rejecting duplicate impact factor ids.
    pub fn new(factors: Vec<ImpactFactor>) -> Result<Self> {
        anyhow::ensure!(!factors.is_empty(), "Process catalog is empty");

        let mut ids = HashSet::with_capacity(factors.len());
        for factor in &factors {
            if !ids.insert(factor.id.as_str()) {
                anyhow::bail!(
                    "Catalog uniqueness violated: impact_factor_id '{}' appears more than once",
                    factor.id
                );
            }
        }

        let mut seen = HashSet::new();
        let products = factors
            .iter()
            .filter(|f| seen.insert(f.reference_product.as_str()))
            .map(|f| f.reference_product.clone())
            .collect();

        Ok(Self { factors, products })
    }

    pub fn factors(&self) -> &[ImpactFactor] {
        &self.factors
    }

    pub fn get(&self, index: usize) -> Option<&ImpactFactor> {
        self.factors.get(index)
    }

    /// Unique reference products in first-occurrence order. This is the retrieval corpus.
    pub fn products(&self) -> &[String] {
        &self.products
    }

    /// Impact factors producing any of `products`, grouped in the given product order
    /// so factors of higher-ranked products come first. Names collapse to their first
    /// occurrence.
    pub fn factors_for_products(&self, products: &[String]) -> Vec<(usize, &ImpactFactor)> {
        let mut seen_names = HashSet::new();
        let mut out = Vec::new();
        for product in products {
            for (index, factor) in self.factors.iter().enumerate() {
                if &factor.reference_product != product {
                    continue;
                }
                if seen_names.insert(factor.name.as_str()) {
                    out.push((index, factor));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct EioCatalog {
    entries: Vec<NaicsEntry>,
    descriptions: Vec<String>,
}

impl EioCatalog {
    /// Build the catalog, keeping the first row for each description.
    pub fn new(entries: Vec<NaicsEntry>) -> Result<Self> {
        anyhow::ensure!(!entries.is_empty(), "NAICS catalog is empty");

        let mut seen = HashSet::new();
        let entries: Vec<NaicsEntry> =
            entries.into_iter().filter(|e| seen.insert(e.description.clone())).collect();
        let descriptions = entries.iter().map(|e| e.description.clone()).collect();
        Ok(Self { entries, descriptions })
    }

    pub fn entries(&self) -> &[NaicsEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&NaicsEntry> {
        self.entries.get(index)
    }

    /// One description per entry. This is the retrieval corpus.
    pub fn descriptions(&self) -> &[String] {
        &self.descriptions
    }

    /// First entry carrying `code`, with its position.
    pub fn find_code(&self, code: &str) -> Option<(usize, &NaicsEntry)> {
        self.entries.iter().enumerate().find(|(_, e)| e.code == code)
    }
}

#[derive(Debug, Clone)]
pub enum ReferenceCatalog {
    Process(ProcessCatalog),
    Eio(EioCatalog),
}

impl ReferenceCatalog {
    pub fn kind(&self) -> TaskKind {
        match self {
            ReferenceCatalog::Process(_) => TaskKind::Process,
            ReferenceCatalog::Eio(_) => TaskKind::Eio,
        }
    }

    /// Texts that get embedded and searched.
    pub fn corpus(&self) -> &[String] {
        match self {
            ReferenceCatalog::Process(c) => c.products(),
            ReferenceCatalog::Eio(c) => c.descriptions(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReferenceCatalog::Process(c) => c.factors().len(),
            ReferenceCatalog::Eio(c) => c.entries().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
