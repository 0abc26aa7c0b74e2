//! # Order Validation
//!
//! Structural rules an order must satisfy before it is persisted. The
//! validator is an immutable value built once at startup and shared by all
//! workers; it holds its compiled patterns and nothing else.
//!
//! Validation collects every violation instead of stopping at the first, so
//! a rejected message is logged with the full list of problems.

use crate::model::Order;
use regex::Regex;
use std::fmt;
use thiserror::Error;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";
const CURRENCY_PATTERN: &str = r"^[A-Z]{3}$";
const LOCALES: [&str; 2] = ["ru", "en"];

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path to the field, e.g. `items[0].sale`.
    pub field: String,
    pub rule: Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    NonNegative,
    Positive,
    OneOf(&'static [&'static str]),
    Email,
    CurrencyCode,
    Range { min: i64, max: i64 },
    NonEmptyList,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "is required"),
            Self::NonNegative => write!(f, "must be >= 0"),
            Self::Positive => write!(f, "must be > 0"),
            Self::OneOf(allowed) => write!(f, "must be one of [{}]", allowed.join(", ")),
            Self::Email => write!(f, "must be a valid email address"),
            Self::CurrencyCode => write!(f, "must be a 3-letter currency code"),
            Self::Range { min, max } => write!(f, "must be between {min} and {max}"),
            Self::NonEmptyList => write!(f, "must contain at least one element"),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.rule)
    }
}

/// An order that failed one or more rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Order {order_uid:?} is invalid: {}", join(.violations))]
pub struct ValidationError {
    pub order_uid: String,
    pub violations: Vec<Violation>,
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects violations for one order.
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn fail(&mut self, field: impl Into<String>, rule: Rule) {
        self.violations.push(Violation {
            field: field.into(),
            rule,
        });
    }

    /// A string is present when it is non-empty; whitespace counts as content.
    fn required(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.fail(field, Rule::Required);
        }
    }

    fn non_negative(&mut self, field: &str, value: i64) {
        if value < 0 {
            self.fail(field, Rule::NonNegative);
        }
    }
}

/// Validates decoded orders against the storage model's rules.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    email: Regex,
    currency: Regex,
}

impl OrderValidator {
    /// Compiles the validator's patterns.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(EMAIL_PATTERN)?,
            currency: Regex::new(CURRENCY_PATTERN)?,
        })
    }

    /// Checks every rule; `Ok(())` when the order is valid.
    pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        let mut c = Checker {
            violations: Vec::new(),
        };

        c.required("order_uid", &order.order_uid);
        c.required("track_number", &order.track_number);
        c.required("entry", &order.entry);
        c.required("customer_id", &order.customer_id);
        c.required("delivery_service", &order.delivery_service);
        c.required("oof_shard", &order.oof_shard);
        if !LOCALES.contains(&order.locale.as_str()) {
            c.fail("locale", Rule::OneOf(&LOCALES));
        }
        c.non_negative("sm_id", order.sm_id);

        let d = &order.delivery;
        c.required("delivery.name", &d.name);
        c.required("delivery.phone", &d.phone);
        c.required("delivery.zip", &d.zip);
        c.required("delivery.city", &d.city);
        c.required("delivery.address", &d.address);
        c.required("delivery.region", &d.region);
        c.required("delivery.email", &d.email);
        if !d.email.is_empty() && !self.email.is_match(&d.email) {
            c.fail("delivery.email", Rule::Email);
        }

        let p = &order.payment;
        c.required("payment.transaction", &p.transaction);
        c.required("payment.provider", &p.provider);
        c.required("payment.bank", &p.bank);
        if !self.currency.is_match(&p.currency) {
            c.fail("payment.currency", Rule::CurrencyCode);
        }
        c.non_negative("payment.amount", p.amount);
        if p.payment_dt <= 0 {
            c.fail("payment.payment_dt", Rule::Positive);
        }
        c.non_negative("payment.delivery_cost", p.delivery_cost);
        c.non_negative("payment.goods_total", p.goods_total);
        c.non_negative("payment.custom_fee", p.custom_fee);

        if order.items.is_empty() {
            c.fail("items", Rule::NonEmptyList);
        }
        for (i, item) in order.items.iter().enumerate() {
            let field = |name: &str| format!("items[{i}].{name}");
            c.non_negative(&field("chrt_id"), item.chrt_id);
            c.required(&field("track_number"), &item.track_number);
            c.non_negative(&field("price"), item.price);
            c.required(&field("rid"), &item.rid);
            c.required(&field("name"), &item.name);
            if !(0..=100).contains(&item.sale) {
                c.fail(field("sale"), Rule::Range { min: 0, max: 100 });
            }
            c.required(&field("size"), &item.size);
            c.non_negative(&field("total_price"), item.total_price);
            c.non_negative(&field("nm_id"), item.nm_id);
            c.required(&field("brand"), &item.brand);
            c.non_negative(&field("status"), item.status);
        }

        if c.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                order_uid: order.order_uid.clone(),
                violations: c.violations,
            })
        }
    }
}
