// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection strings

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    str::FromStr,
};

use url::{Host, Url};

use crate::{Error, Result};

const SCHEME_SEPARATOR: &str = "://";

/// Placeholder scheme for parsing the authority with [`Url`].
///
/// Must not be one of the special schemes like `http`, which
/// normalize hosts and imply default ports.
const AUTHORITY_SCHEME: &str = "plc";

/// A parsed connection string.
///
/// Connection strings have the form
/// `scheme[:transport]://host[:port][/path][?key=value[&key=value...]]`,
/// e.g. `modbus:tcp://192.168.222.33?unit-identifier=32`.
///
/// Query parameters are stored verbatim. Their meaning is up to the
/// [`Driver`](crate::driver::Driver) that opens the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    scheme: String,
    transport: Option<String>,
    host: String,
    port: Option<u16>,
    path: Option<String>,
    parameters: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    /// Parses a connection string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedConnectionString`] if the scheme is missing
    /// or if the authority or the query parameters are not well-formed.
    pub fn parse(input: &str) -> Result<Self> {
        let (prefix, rest) = input
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| Error::malformed(input, "missing `://`"))?;

        let (scheme, transport) = match prefix.split_once(':') {
            Some((scheme, transport)) => (scheme, Some(transport)),
            None => (prefix, None),
        };
        if !is_valid_scheme(scheme) {
            return Err(Error::malformed(input, "invalid scheme"));
        }
        if let Some(transport) = transport {
            if !is_valid_scheme(transport) {
                return Err(Error::malformed(input, "invalid transport"));
            }
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match location.find('/') {
            Some(index) => (&location[..index], Some(&location[index..])),
            None => (location, None),
        };
        let (host, port) = parse_authority(input, authority)?;
        let parameters = match query {
            Some(query) => parse_parameters(input, query)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            transport: transport.map(str::to_ascii_lowercase),
            host,
            port,
            path: path.map(ToOwned::to_owned),
            parameters,
        })
    }

    /// The driver scheme, e.g. `modbus` or `s7`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The optional transport code, e.g. `tcp` in `modbus:tcp://`.
    #[must_use]
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Looks up a single query parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Re-serializes the query parameters, ordered by key.
    #[must_use]
    pub fn query_string(&self) -> String {
        let mut query = String::new();
        for (key, value) in &self.parameters {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(key);
            query.push('=');
            query.push_str(value);
        }
        query
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scheme)?;
        if let Some(transport) = &self.transport {
            write!(f, ":{transport}")?;
        }
        f.write_str(SCHEME_SEPARATOR)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        if !self.parameters.is_empty() {
            write!(f, "?{}", self.query_string())?;
        }
        Ok(())
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_'))
}

fn parse_authority(input: &str, authority: &str) -> Result<(String, Option<u16>)> {
    let url = Url::parse(&format!("{AUTHORITY_SCHEME}{SCHEME_SEPARATOR}{authority}"))
        .map_err(|err| Error::malformed(input, authority_error(err)))?;
    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::malformed(input, "unexpected user info"));
    }
    if url.fragment().is_some() {
        return Err(Error::malformed(input, "unexpected fragment"));
    }
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_owned(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        // Without brackets
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => String::new(),
    };
    if host.is_empty() {
        return Err(Error::malformed(input, "missing host"));
    }
    Ok((host, url.port()))
}

fn authority_error(err: url::ParseError) -> &'static str {
    match err {
        url::ParseError::EmptyHost => "missing host",
        url::ParseError::InvalidPort => "invalid port",
        url::ParseError::InvalidIpv6Address => "invalid IPv6 address",
        _ => "invalid host",
    }
}

fn parse_parameters(input: &str, query: &str) -> Result<BTreeMap<String, String>> {
    let mut parameters = BTreeMap::new();
    if query.is_empty() {
        return Ok(parameters);
    }
    for pair in query.split('&') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::malformed(input, "parameter without `=`"))?;
        if key.is_empty() {
            return Err(Error::malformed(input, "empty parameter name"));
        }
        if parameters.insert(key.to_owned(), value.to_owned()).is_some() {
            return Err(Error::malformed(input, "duplicate parameter"));
        }
    }
    Ok(parameters)
}
