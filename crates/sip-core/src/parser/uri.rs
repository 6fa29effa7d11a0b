//! SIP-URI / SIPS-URI grammar (RFC 3261 §25.1)
//!
//! ```text
//! SIP-URI   = "sip:" [ userinfo ] hostport uri-parameters [ headers ]
//! userinfo  = ( user / telephone-subscriber ) [ ":" password ] "@"
//! hostport  = host [ ":" port ]
//! headers   = "?" header *( "&" header )
//! ```

use std::str;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::digit1,
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
};

use super::ParseResult;
use crate::types::uri::{Scheme, Uri};

// mark = "-" / "_" / "." / "!" / "~" / "*" / "'" / "(" / ")"
fn is_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}

// user-unreserved = "&" / "=" / "+" / "$" / "," / ";" / "?" / "/"
// ";" and "?" are left out so parameters and headers stay unambiguous.
// ":" admits the password.
fn is_user_char(c: u8) -> bool {
    is_unreserved(c) || matches!(c, b'%' | b'&' | b'=' | b'+' | b'$' | b',' | b'/' | b':')
}

// param-unreserved = "[" / "]" / "/" / ":" / "&" / "+" / "$"
fn is_param_char(c: u8) -> bool {
    is_unreserved(c) || matches!(c, b'%' | b'[' | b']' | b'/' | b':' | b'&' | b'+' | b'$')
}

// hnv-unreserved = "[" / "]" / "/" / "?" / ":" / "+" / "$"
fn is_header_char(c: u8) -> bool {
    is_unreserved(c) || matches!(c, b'%' | b'[' | b']' | b'/' | b'?' | b':' | b'+' | b'$')
}

fn is_hostname_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.'
}

fn is_ipv6_char(c: u8) -> bool {
    c.is_ascii_hexdigit() || c == b':' || c == b'.'
}

fn to_string(bytes: &[u8]) -> Result<String, str::Utf8Error> {
    str::from_utf8(bytes).map(str::to_string)
}

pub fn scheme(input: &[u8]) -> ParseResult<Scheme> {
    alt((
        value(Scheme::Sips, tag_no_case(b"sips:")),
        value(Scheme::Sip, tag_no_case(b"sip:")),
    ))(input)
}

// userinfo, without the trailing "@"
fn userinfo(input: &[u8]) -> ParseResult<String> {
    terminated(map_res(take_while1(is_user_char), to_string), tag(b"@"))(input)
}

// IPv6 references keep their brackets
pub fn host(input: &[u8]) -> ParseResult<String> {
    map_res(
        alt((
            recognize(delimited(tag(b"["), take_while1(is_ipv6_char), tag(b"]"))),
            take_while1(is_hostname_char),
        )),
        to_string,
    )(input)
}

pub fn port(input: &[u8]) -> ParseResult<u16> {
    preceded(
        tag(b":"),
        map_res(map_res(digit1, str::from_utf8), |digits: &str| digits.parse::<u16>()),
    )(input)
}

// ";" pname [ "=" pvalue ]
fn uri_parameter(input: &[u8]) -> ParseResult<(String, Option<String>)> {
    preceded(
        tag(b";"),
        pair(
            map_res(take_while1(is_param_char), to_string),
            opt(preceded(
                tag(b"="),
                map_res(take_while1(is_param_char), to_string),
            )),
        ),
    )(input)
}

fn uri_headers(input: &[u8]) -> ParseResult<Vec<(String, String)>> {
    preceded(
        tag(b"?"),
        separated_list1(
            tag(b"&"),
            separated_pair(
                map_res(take_while1(is_header_char), to_string),
                tag(b"="),
                map_res(take_while(is_header_char), to_string),
            ),
        ),
    )(input)
}

/// Parse a complete `sip:` or `sips:` URI
pub fn parse_uri(input: &[u8]) -> ParseResult<Uri> {
    map(
        tuple((
            scheme,
            opt(userinfo),
            host,
            opt(port),
            many0(uri_parameter),
            opt(uri_headers),
        )),
        |(scheme, user, host, port, params, headers)| Uri {
            scheme,
            user,
            host,
            port,
            params,
            headers: headers.unwrap_or_default(),
        },
    )(input)
}
