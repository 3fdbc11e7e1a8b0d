use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::message::{Header, Message, RECORD_SEPARATOR, UNIT_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    UnexpectedToken,
    UnexpectedEof,
    InvalidNumberOfArguments,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorTag::UnexpectedToken => "unexpected token",
            ErrorTag::UnexpectedEof => "unexpected end of input",
            ErrorTag::InvalidNumberOfArguments => "invalid number of arguments",
        };
        f.write_str(name)
    }
}

/// A malformed region of the input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{tag} at offset {offset} (length {length})")]
pub struct ParseError {
    pub offset: usize,
    pub length: usize,
    pub tag: ErrorTag,
}

impl ParseError {
    fn new(offset: usize, length: usize, tag: ErrorTag) -> Self {
        Self {
            offset,
            length,
            tag,
        }
    }
}

/// Split a frame into messages. Malformed messages are skipped and
/// reported; well-formed messages around them are still returned.
pub fn parse(input: &[u8]) -> (Vec<Message>, Vec<ParseError>) {
    let mut messages = Vec::new();
    let mut errors = Vec::new();
    let mut offset = 0;

    while offset < input.len() {
        let Some(end) = input[offset..]
            .iter()
            .position(|b| *b == RECORD_SEPARATOR)
            .map(|p| offset + p)
        else {
            errors.push(ParseError::new(
                offset,
                input.len() - offset,
                ErrorTag::UnexpectedEof,
            ));
            break;
        };

        let chunk = &input[offset..end];
        match parse_message(chunk) {
            Ok(message) => {
                trace!("Parsed message: {}", message);
                messages.push(message);
            }
            Err(tag) => {
                // an empty record still covers its separator
                errors.push(ParseError::new(offset, chunk.len().max(1), tag));
            }
        }

        offset = end + 1;
    }

    (messages, errors)
}

fn parse_message(chunk: &[u8]) -> Result<Message, ErrorTag> {
    if chunk.is_empty() {
        return Err(ErrorTag::UnexpectedToken);
    }

    let fields: Vec<&[u8]> = chunk.split(|b| *b == UNIT_SEPARATOR).collect();
    let (header, used) = Header::match_fields(&fields).ok_or(ErrorTag::UnexpectedToken)?;

    let arguments = &fields[used..];
    let (min, max) = header
        .num_arguments()
        .ok_or(ErrorTag::UnexpectedToken)?;
    if arguments.len() < min || arguments.len() > max {
        return Err(ErrorTag::InvalidNumberOfArguments);
    }

    let mut message = Message::from_header(header);
    for argument in arguments {
        message.add_argument(argument.to_vec());
    }
    Ok(message)
}
