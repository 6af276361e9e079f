//! Pipeline configuration
//!
//! Paths, regulator account codes, and the institution name -> ticker
//! mapping are carried in one explicit struct handed to the pipeline
//! entry point. Defaults match the regulator's chart of accounts and
//! the covered banks; a TOML file can override any field.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Account codes used to extract balances from regulator filings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountCodes {
    /// Cumulative income since semester start (credit result)
    pub income: u64,
    /// Cumulative expense since semester start, reported as a negative amount
    pub expense: u64,
    /// Point-in-time equity
    pub equity: u64,
}

impl Default for AccountCodes {
    fn default() -> Self {
        Self {
            income: 7_000_000_003,
            expense: 8_000_000_002,
            equity: 6_100_000_007,
        }
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Historical workbook, one sheet per ticker
    pub workbook_path: PathBuf,
    /// Directory holding regulator CSV filings (*BANCOS.CSV)
    pub filings_dir: PathBuf,
    pub account_codes: AccountCodes,
    /// Institution name as printed in filings -> 4-letter ticker
    pub institutions: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workbook_path: PathBuf::from("historical/Balancetes_por_ticker.xlsx"),
            filings_dir: PathBuf::from("."),
            account_codes: AccountCodes::default(),
            institutions: default_institutions(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing fields fall back
    /// to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Load from a file when one is given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Banks covered by the regulator feed, keyed by the institution name
/// exactly as the filings print it.
fn default_institutions() -> BTreeMap<String, String> {
    [
        ("BCO DO BRASIL S.A.", "BBAS"),
        ("BCO BRADESCO S.A.", "BBDC"),
        ("BCO SANTANDER (BRASIL) S.A.", "SANB"),
        ("ITAÚ UNIBANCO HOLDING S.A.", "ITUB"),
        ("BCO ABC BRASIL S.A.", "ABCB"),
        ("BCO DA AMAZONIA S.A.", "BAZA"),
        ("BCO MERCANTIL DO BRASIL S.A.", "BMEB"),
        ("BCO BMG S.A.", "BMGB"),
        ("BCO PINE S.A.", "PINE"),
        ("BCO DO ESTADO DO RS S.A.", "BRSR"),
        ("BANCO BTG PACTUAL S.A.", "BPAC"),
        ("BCO DO EST. DE SE S.A.", "BGIP"),
        ("BCO BANESTES S.A.", "BEES"),
        ("BRB - BCO DE BRASILIA S.A.", "BLIS"),
        ("BANCO PAN", "BPAN"),
        (
            "NU FINANCEIRA S.A. - SOCIEDADE DE CRÉDITO, FINANCIAMENTO E INVESTIMENTO",
            "ROXO",
        ),
        ("BANCO INTER", "INBR"),
        ("BCO XP S.A.", "XPBR"),
    ]
    .into_iter()
    .map(|(name, ticker)| (name.to_string(), ticker.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codes_match_regulator_chart() {
        let codes = AccountCodes::default();
        assert_eq!(codes.income, 7_000_000_003);
        assert_eq!(codes.expense, 8_000_000_002);
        assert_eq!(codes.equity, 6_100_000_007);
    }

    #[test]
    fn default_institutions_cover_known_banks() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.institutions.get("BCO DO BRASIL S.A.").map(String::as_str),
            Some("BBAS")
        );
        assert_eq!(config.institutions.len(), 18);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: PipelineConfig = toml::from_str(
            r#"
            filings_dir = "/data/filings"

            [institutions]
            "BCO TESTE S.A." = "TEST"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.filings_dir, PathBuf::from("/data/filings"));
        assert_eq!(parsed.account_codes.income, 7_000_000_003);
        assert_eq!(
            parsed.institutions.get("BCO TESTE S.A.").map(String::as_str),
            Some("TEST")
        );
    }
}
