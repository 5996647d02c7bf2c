// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read responses

use std::fmt::{self, Display};

use crate::ResponseValue;

/// Outcome of reading a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// The value has been read and decoded.
    Ok,

    /// The field is unknown, either to the request or to the device.
    NotFound,

    /// The device rejected the address, e.g. because it is out of range.
    InvalidAddress,

    /// The device (or a gateway in between) didn't answer in time.
    Timeout,

    /// The device reported an error or returned undecodable data.
    RemoteError,
}

impl ResponseCode {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::Timeout => "TIMEOUT",
            Self::RemoteError => "REMOTE_ERROR",
        }
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response code and value of a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseItem {
    code: ResponseCode,
    value: Option<ResponseValue>,
}

impl ResponseItem {
    pub(crate) const fn ok(value: ResponseValue) -> Self {
        Self {
            code: ResponseCode::Ok,
            value: Some(value),
        }
    }

    pub(crate) const fn failed(code: ResponseCode) -> Self {
        debug_assert!(!code.is_ok());
        Self { code, value: None }
    }

    #[must_use]
    pub const fn code(&self) -> ResponseCode {
        self.code
    }

    /// The decoded value, only present if the code is [`ResponseCode::Ok`].
    #[must_use]
    pub const fn value(&self) -> Option<&ResponseValue> {
        self.value.as_ref()
    }
}

/// The result of executing a [`ReadRequest`](crate::ReadRequest).
///
/// Contains exactly one item per requested field, in request order.
/// Always check the [`ResponseCode`] of a field before using its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResponse {
    items: Vec<(String, ResponseItem)>,
}

impl ReadResponse {
    pub(crate) fn new(items: Vec<(String, ResponseItem)>) -> Self {
        Self { items }
    }

    /// The response code of a field.
    ///
    /// Returns [`ResponseCode::NotFound`] for names that were not requested.
    #[must_use]
    pub fn response_code(&self, name: &str) -> ResponseCode {
        self.get(name)
            .map_or(ResponseCode::NotFound, ResponseItem::code)
    }

    /// The decoded value of a field.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&ResponseValue> {
        self.get(name).and_then(ResponseItem::value)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResponseItem> {
        self.items
            .iter()
            .find_map(|(field, item)| (field == name).then_some(item))
    }

    /// The requested field names in request order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResponseItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` if all fields have been read successfully.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.items.iter().all(|(_, item)| item.code().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> ReadResponse {
        ReadResponse::new(vec![
            (
                "temperature".to_owned(),
                ResponseItem::ok(ResponseValue::Int16(215)),
            ),
            (
                "pressure".to_owned(),
                ResponseItem::failed(ResponseCode::InvalidAddress),
            ),
        ])
    }

    #[test]
    fn lookup_by_name() {
        let response = response();
        assert_eq!(response.len(), 2);
        assert_eq!(response.response_code("temperature"), ResponseCode::Ok);
        assert_eq!(
            response.value("temperature").unwrap().as_i16().unwrap(),
            215
        );
        assert_eq!(
            response.response_code("pressure"),
            ResponseCode::InvalidAddress
        );
        assert!(response.value("pressure").is_none());
        assert!(!response.all_ok());
    }

    #[test]
    fn unknown_names_are_not_found() {
        let response = response();
        assert_eq!(response.response_code("field"), ResponseCode::NotFound);
        assert!(response.value("field").is_none());
    }

    #[test]
    fn keeps_request_order() {
        let response = response();
        let names: Vec<_> = response.field_names().collect();
        assert_eq!(names, ["temperature", "pressure"]);
    }

    #[test]
    fn response_code_names() {
        assert_eq!(ResponseCode::Ok.to_string(), "OK");
        assert_eq!(ResponseCode::RemoteError.to_string(), "REMOTE_ERROR");
    }
}
