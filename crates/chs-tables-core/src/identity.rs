//! File identity derived from a CHS file name.
//!
//! CHS base names carry seven underscore-delimited tokens, for example
//! `SACSNCSEFL_ATL_2024_Post96_SP_V22a_Peaks`. The last token (the
//! "type tag") together with the file's declared format version selects
//! the schema case. A name that does not decompose into exactly seven
//! tokens is ineligible and must be rejected before conversion starts.

use snafu::prelude::*;

/// Exact number of underscore-delimited tokens in an eligible base name.
pub const TOKEN_COUNT: usize = 7;

/// Errors raised while decomposing a file name.
#[derive(Debug, Snafu)]
pub enum IdentityError {
    /// The base name did not split into exactly seven tokens.
    #[snafu(display(
        "Ineligible file name {stem}: expected {TOKEN_COUNT} underscore-delimited tokens, found {found}"
    ))]
    TokenCount {
        /// The offending base name.
        stem: String,
        /// Number of tokens actually found.
        found: usize,
    },
}

/// The seven identity tokens of one CHS file, plus the original stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// Full base name without extension (the dataset name).
    pub stem: String,
    /// Token 1: data source / coastal study, for example `SACSNCSEFL`.
    pub source_id: String,
    /// Token 2: model identifier.
    pub model_id: String,
    /// Token 3: run identifier.
    pub run_id: String,
    /// Token 4: category identifier.
    pub category_id: String,
    /// Token 5: sub-category identifier.
    pub sub_id: String,
    /// Token 6: variant identifier.
    pub variant_id: String,
    /// Token 7: type tag selecting the schema case.
    pub type_tag: String,
}

impl FileIdentity {
    /// Decompose a base name (no directory, no extension) into its tokens.
    pub fn parse(stem: &str) -> Result<Self, IdentityError> {
        let tokens: Vec<&str> = stem.split('_').collect();
        ensure!(
            tokens.len() == TOKEN_COUNT,
            TokenCountSnafu {
                stem,
                found: tokens.len(),
            }
        );
        Ok(FileIdentity {
            stem: stem.to_string(),
            source_id: tokens[0].to_string(),
            model_id: tokens[1].to_string(),
            run_id: tokens[2].to_string(),
            category_id: tokens[3].to_string(),
            sub_id: tokens[4].to_string(),
            variant_id: tokens[5].to_string(),
            type_tag: tokens[6].to_string(),
        })
    }

    /// True for `Timeseries` files.
    pub fn is_timeseries(&self) -> bool {
        self.type_tag == "Timeseries"
    }

    /// True for the plottable type tags (`Peaks`, `Timeseries`).
    pub fn is_plottable(&self) -> bool {
        matches!(self.type_tag.as_str(), "Peaks" | "Timeseries")
    }

    /// True when the type tag names an AEF product (`AEF`, `AEFcond`, ...).
    pub fn is_aef(&self) -> bool {
        self.type_tag.contains("AEF")
    }
}
