//! nom parsers for the textual values carried inside SIP messages

use nom::IResult;

pub mod uri;

// Type alias for parser result
pub type ParseResult<'a, O> = IResult<&'a [u8], O>;
