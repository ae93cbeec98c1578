use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{error::ValidationError, units::parse_ether_amount};

/// The user-editable fields of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    AddressTo,
    Amount,
    Keyword,
    Message,
}

impl FormField {
    pub const ALL: [FormField; 4] = [
        FormField::AddressTo,
        FormField::Amount,
        FormField::Keyword,
        FormField::Message,
    ];
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormField::AddressTo => "addressTo",
            FormField::Amount => "amount",
            FormField::Keyword => "keyword",
            FormField::Message => "message",
        };
        f.write_str(name)
    }
}

impl FromStr for FormField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormField::ALL
            .into_iter()
            .find(|field| field.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown form field {:?}", s))
    }
}

/// Transient form state, edited field by field before a submit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionForm {
    pub address_to: String,
    /// Decimal ether amount as typed by the user.
    pub amount: String,
    pub keyword: String,
    pub message: String,
}

impl TransactionForm {
    pub fn new(
        address_to: impl Into<String>,
        amount: impl Into<String>,
        keyword: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            address_to: address_to.into(),
            amount: amount.into(),
            keyword: keyword.into(),
            message: message.into(),
        }
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::AddressTo => &self.address_to,
            FormField::Amount => &self.amount,
            FormField::Keyword => &self.keyword,
            FormField::Message => &self.message,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::AddressTo => &mut self.address_to,
            FormField::Amount => &mut self.amount,
            FormField::Keyword => &mut self.keyword,
            FormField::Message => &mut self.message,
        };
        *slot = value.into();
    }

    /// Checks every field locally. No field may be blank, the recipient must be
    /// an address and the amount a non-negative ether decimal.
    pub fn validate(&self) -> Result<ValidatedTransfer, ValidationError> {
        if let Some(field) = FormField::ALL
            .into_iter()
            .find(|field| self.get(*field).trim().is_empty())
        {
            return Err(ValidationError::EmptyField(field));
        }

        let to = Address::from_str(self.address_to.trim())
            .map_err(|_| ValidationError::InvalidAddress(self.address_to.clone()))?;
        let amount = parse_ether_amount(&self.amount)?;

        Ok(ValidatedTransfer {
            to,
            amount,
            keyword: self.keyword.clone(),
            message: self.message.clone(),
        })
    }
}

/// A form that passed validation, with the amount already in wei.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub to: Address,
    pub amount: U256,
    pub keyword: String,
    pub message: String,
}
