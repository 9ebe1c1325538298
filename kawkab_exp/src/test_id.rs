use crate::System;
use color_eyre::eyre::{self, WrapErr};
use color_eyre::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one parameter combination of a benchmark. Its textual form is
/// the name of the results directory, so the sweep driver and the results
/// parser must produce exactly the same string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestId {
    pub system: System,
    /// Includes the test type, e.g. `rw-kw48`.
    pub prefix: String,
    /// Total number of clients across all client machines.
    pub num_clients: usize,
    /// Only encoded in BTrDB identifiers; zero when parsed from a kawkab one.
    pub clients_per_machine: usize,
    pub batch_size: usize,
    pub record_size: usize,
    pub files_per_client: usize,
    pub write_ratio: usize,
    /// Inter-arrival time between client requests.
    pub iat: f64,
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.system {
            System::Kawkab => write!(
                f,
                "{}-nc{}-bs{}-rs{}-nf{}-wr{}-iat{}",
                self.prefix,
                self.num_clients,
                self.batch_size,
                self.record_size,
                self.files_per_client,
                self.write_ratio,
                fmt_g(self.iat)
            ),
            System::Btrdb => write!(
                f,
                "{}-nc{}-cpm{}-bs{}-rs{}-nf{}-wr{}-iat{:.2}",
                self.prefix,
                self.num_clients,
                self.clients_per_machine,
                self.batch_size,
                self.record_size,
                self.files_per_client,
                self.write_ratio,
                self.iat
            ),
        }
    }
}

impl FromStr for TestId {
    type Err = Report;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        // the iat may be in exponent form (e.g. `1e-05`), so split it first
        let (rest, iat) = id
            .rsplit_once("-iat")
            .ok_or_else(|| eyre::eyre!("test id {:?} has no iat", id))?;
        let iat = iat
            .parse::<f64>()
            .wrap_err_with(|| format!("parse iat of test id {:?}", id))?;

        // the prefix may contain dashes; pop the fields from the end
        let mut parts: Vec<_> = rest.split('-').collect();
        let write_ratio = pop_field(&mut parts, "wr", id)?;
        let files_per_client = pop_field(&mut parts, "nf", id)?;
        let record_size = pop_field(&mut parts, "rs", id)?;
        let batch_size = pop_field(&mut parts, "bs", id)?;
        let is_btrdb = parts
            .last()
            .map(|part| part.starts_with("cpm"))
            .unwrap_or(false);
        let (system, clients_per_machine) = if is_btrdb {
            (System::Btrdb, pop_field(&mut parts, "cpm", id)?)
        } else {
            (System::Kawkab, 0)
        };
        let num_clients = pop_field(&mut parts, "nc", id)?;
        if parts.is_empty() {
            eyre::bail!("test id {:?} has no prefix", id);
        }
        let prefix = parts.join("-");

        Ok(Self {
            system,
            prefix,
            num_clients,
            clients_per_machine,
            batch_size,
            record_size,
            files_per_client,
            write_ratio,
            iat,
        })
    }
}

fn pop_field(
    parts: &mut Vec<&str>,
    tag: &str,
    id: &str,
) -> Result<usize, Report> {
    let part = parts
        .pop()
        .ok_or_else(|| eyre::eyre!("test id {:?} is missing {}", id, tag))?;
    let value = part.strip_prefix(tag).ok_or_else(|| {
        eyre::eyre!("expected {} in test id {:?}, found {:?}", tag, id, part)
    })?;
    value
        .parse()
        .wrap_err_with(|| format!("parse {} of test id {:?}", tag, id))
}

/// Formats like C's `%g`: six significant digits, exponent notation when the
/// exponent is below -4 or at least 6, and no trailing zeros.
pub fn fmt_g(value: f64) -> String {
    const PRECISION: i32 = 6;
    if value == 0.0 {
        return String::from("0");
    }
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }

    // rounding to the precision may bump the exponent, so let the
    // scientific formatter find it
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = sci
        .split_once('e')
        .expect("scientific notation should have an exponent");
    let exponent = exponent
        .parse::<i32>()
        .expect("scientific notation exponent should be an integer");

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
