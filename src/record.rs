//! Validation of ticket records submitted by the management plane.
//!
//! Fields are checked one at a time so that every failure names the field
//! that caused it.

use serde_json::{Map, Value};
use url::Url;

use crate::backends;
use crate::errors::{Error, Result};
use crate::ops::Op;

#[derive(Debug, Clone)]
pub struct TicketRecord {
    pub uuid: String,
    pub size: u64,
    pub ops: Vec<Op>,
    pub timeout: u64,
    pub url: Url,
    pub inactivity_timeout: Option<u64>,
    pub transfer_id: Option<String>,
    pub filename: Option<String>,
    pub sparse: bool,
    pub dirty: bool,
}

impl TicketRecord {
    pub fn from_value(value: &Value) -> Result<Self> {
        let fields = value
            .as_object()
            .ok_or_else(|| Error::InvalidTicket(value.to_string()))?;

        let uuid = required::<String>(fields, "uuid")?;
        let size = required::<u64>(fields, "size")?;
        let ops = parse_ops(required_value(fields, "ops")?)?;
        let timeout = required::<u64>(fields, "timeout")?;
        let inactivity_timeout = optional::<u64>(fields, "inactivity_timeout")?;
        let url = parse_url(&required::<String>(fields, "url")?)?;
        let transfer_id = optional::<String>(fields, "transfer_id")?;
        let filename = optional::<String>(fields, "filename")?;
        let sparse = optional::<bool>(fields, "sparse")?.unwrap_or(false);
        let dirty = optional::<bool>(fields, "dirty")?.unwrap_or(false);

        Ok(Self {
            uuid,
            size,
            ops,
            timeout,
            url,
            inactivity_timeout,
            transfer_id,
            filename,
            sparse,
            dirty,
        })
    }
}

trait FieldType: Sized {
    const EXPECTING: &'static str;

    fn extract(value: &Value) -> Option<Self>;
}

impl FieldType for String {
    const EXPECTING: &'static str = "expecting a string value";

    fn extract(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FieldType for u64 {
    const EXPECTING: &'static str = "expecting a non-negative integer value";

    fn extract(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FieldType for bool {
    const EXPECTING: &'static str = "expecting a boolean value";

    fn extract(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

fn required_value<'a>(fields: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value> {
    fields.get(key).ok_or(Error::MissingTicketParameter(key))
}

fn required<T: FieldType>(fields: &Map<String, Value>, key: &'static str) -> Result<T> {
    validate(key, required_value(fields, key)?)
}

fn optional<T: FieldType>(fields: &Map<String, Value>, key: &'static str) -> Result<Option<T>> {
    fields.get(key).map(|value| validate(key, value)).transpose()
}

fn validate<T: FieldType>(key: &'static str, value: &Value) -> Result<T> {
    T::extract(value).ok_or_else(|| Error::invalid_parameter(key, value, T::EXPECTING))
}

fn parse_ops(value: &Value) -> Result<Vec<Op>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::invalid_parameter("ops", value, "expecting a list value"))?;

    if items.is_empty() {
        return Err(Error::invalid_parameter(
            "ops",
            value,
            "expecting at least one operation",
        ));
    }

    let mut ops = Vec::with_capacity(items.len());
    for item in items {
        let op = item
            .as_str()
            .ok_or_else(|| Error::invalid_parameter("ops", value, "expecting a list of strings"))?
            .parse::<Op>()
            .map_err(|reason| Error::invalid_parameter("ops", value, reason))?;
        if ops.contains(&op) {
            return Err(Error::invalid_parameter(
                "ops",
                value,
                format!("Duplicate operation: {op}"),
            ));
        }
        ops.push(op);
    }

    Ok(ops)
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|err| Error::invalid_parameter("url", raw, err))?;
    if !backends::supports(url.scheme()) {
        return Err(Error::invalid_parameter(
            "url",
            raw,
            format!("Unsupported url scheme: {}", url.scheme()),
        ));
    }
    Ok(url)
}
