//! Method table of the token chaincode.
//!
//! Names are matched case-insensitively. Each method is exactly one of:
//! a signed invoke (goes through the gate), an unsigned invoke (the hash
//! preimage is the credential) or a query (read-only, no nonce).

use std::fmt;
use std::str::FromStr;

/// How a method is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    SignedInvoke,
    UnsignedInvoke,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Emit,
    Transfer,
    Initialize,
    TransferIndustrial,
    SwapBegin,
    SwapDone,
    SwapCancel,
    MultiSwapBegin,
    MultiSwapDone,
    MultiSwapCancel,
    BalanceOf,
    AllowedBalanceOf,
    IndustrialBalanceOf,
    SwapGet,
    MultiSwapGet,
    Metadata,
}

impl Method {
    pub const ALL: [Method; 16] = [
        Method::Emit,
        Method::Transfer,
        Method::Initialize,
        Method::TransferIndustrial,
        Method::SwapBegin,
        Method::SwapDone,
        Method::SwapCancel,
        Method::MultiSwapBegin,
        Method::MultiSwapDone,
        Method::MultiSwapCancel,
        Method::BalanceOf,
        Method::AllowedBalanceOf,
        Method::IndustrialBalanceOf,
        Method::SwapGet,
        Method::MultiSwapGet,
        Method::Metadata,
    ];

    /// Canonical camel-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Emit => "emit",
            Method::Transfer => "transfer",
            Method::Initialize => "initialize",
            Method::TransferIndustrial => "transferIndustrial",
            Method::SwapBegin => "swapBegin",
            Method::SwapDone => "swapDone",
            Method::SwapCancel => "swapCancel",
            Method::MultiSwapBegin => "multiSwapBegin",
            Method::MultiSwapDone => "multiSwapDone",
            Method::MultiSwapCancel => "multiSwapCancel",
            Method::BalanceOf => "balanceOf",
            Method::AllowedBalanceOf => "allowedBalanceOf",
            Method::IndustrialBalanceOf => "industrialBalanceOf",
            Method::SwapGet => "swapGet",
            Method::MultiSwapGet => "multiSwapGet",
            Method::Metadata => "metadata",
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Method::SwapDone | Method::MultiSwapDone => Access::UnsignedInvoke,
            Method::BalanceOf
            | Method::AllowedBalanceOf
            | Method::IndustrialBalanceOf
            | Method::SwapGet
            | Method::MultiSwapGet
            | Method::Metadata => Access::Query,
            _ => Access::SignedInvoke,
        }
    }

    /// Number of business arguments, excluding the signature trailer.
    pub fn arity(&self) -> usize {
        match self {
            Method::Initialize | Method::Metadata => 0,
            Method::SwapCancel
            | Method::MultiSwapCancel
            | Method::BalanceOf
            | Method::IndustrialBalanceOf
            | Method::SwapGet
            | Method::MultiSwapGet => 1,
            Method::Emit
            | Method::SwapDone
            | Method::MultiSwapDone
            | Method::AllowedBalanceOf => 2,
            Method::Transfer => 3,
            Method::TransferIndustrial | Method::SwapBegin | Method::MultiSwapBegin => 4,
        }
    }

    /// Checks the argument count.
    pub fn args<'a>(&self, args: &'a [String]) -> Result<&'a [String], String> {
        if args.len() == self.arity() {
            Ok(args)
        } else {
            Err(format!(
                "{} takes {} arguments, got {}",
                self.name(),
                self.arity(),
                args.len()
            ))
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
