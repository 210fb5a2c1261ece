//! # Multi-Asset Swaps
//!
//! A multiswap carries several `(group, amount)` legs under one hash lock and
//! one transaction id. It reuses the single-asset machinery in
//! [`crate::swap`]: the same [`SwapBook`], the same checks and the same
//! coordinator. What differs is only the record shape and the `Assets`
//! argument it is built from:
//!
//! ```json
//! {"Assets":[{"group":"FIAT","amount":"1"}]}
//! ```
//!
//! Legs are debited and credited through one ledger `apply`, so either every
//! leg moves or none does.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ChaincodeError;
use crate::swap::{AssetLeg, Swap, SwapBook, SwapHeader};
use crate::token::TokenChaincode;

/// The `assetsJson` argument of `multiSwapBegin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsArg {
    #[serde(rename = "Assets")]
    pub assets: Vec<AssetLeg>,
}

impl AssetsArg {
    /// Parses and validates the legs: at least one, no zero amounts, no
    /// group twice, every group belonging to `token`.
    pub fn parse(json: &str, token: &str) -> Result<Vec<AssetLeg>, ChaincodeError> {
        let parsed: AssetsArg = serde_json::from_str(json)?;
        if parsed.assets.is_empty() {
            return Err(ChaincodeError::invalid_argument("multiswap needs at least one asset"));
        }

        let token = token.to_uppercase();
        let mut seen = HashSet::new();
        let mut legs = Vec::with_capacity(parsed.assets.len());
        for leg in parsed.assets {
            let group = leg.group.to_uppercase();
            if leg.amount.is_zero() {
                return Err(ChaincodeError::invalid_argument(format!(
                    "asset {group}: amount must be positive"
                )));
            }
            if crate::token::group_symbol(&group) != token {
                return Err(ChaincodeError::invalid_argument(format!(
                    "asset {group} does not belong to token {token}"
                )));
            }
            if !seen.insert(group.clone()) {
                return Err(ChaincodeError::invalid_argument(format!(
                    "asset {group} listed twice"
                )));
            }
            legs.push(AssetLeg {
                group,
                amount: leg.amount,
            });
        }
        Ok(legs)
    }
}

/// A multi-asset swap. All legs transition together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSwapRecord {
    #[serde(flatten)]
    pub header: SwapHeader,
    pub token: String,
    pub assets: Vec<AssetLeg>,
}

impl Swap for MultiSwapRecord {
    const KIND: &'static str = "multiswap";

    fn header(&self) -> &SwapHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut SwapHeader {
        &mut self.header
    }

    fn legs(&self) -> Vec<AssetLeg> {
        self.assets.clone()
    }

    fn book(chaincode: &TokenChaincode) -> &SwapBook<Self> {
        chaincode.multiswaps()
    }
}
