use std::fmt;

use crate::error::{Error, Result};

fn parse_error<T: Into<String>>(what: T) -> Error {
    Error::Parse { what: what.into() }
}

/// Physical quantity as it appears in NML2/LEMS attributes: a number with an
/// optional unit symbol, e.g. `-70mV`, `6.3 degC`, `5e-5`.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct Quantity {
    pub value: f64,
    pub unit: Option<String>,
}

impl Quantity {
    pub fn new(value: f64, unit: &str) -> Self {
        let unit = if unit.is_empty() {
            None
        } else {
            Some(unit.to_string())
        };
        Quantity { value, unit }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match parse::quantity(input.trim()) {
            Ok(("", result)) => Ok(result),
            _ => Err(parse_error(format!("Could not parse quantity '{}'", input))),
        }
    }
}

/// LEMS attribute form, unit glued to the number: `-70mV`.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit.as_deref() {
            Some(u) => write!(f, "{}{}", self.value, u),
            None => write!(f, "{}", self.value),
        }
    }
}

mod parse {
    use nom::{
        bytes::complete::take_while, character::complete::space0, character::is_alphanumeric,
        number::complete::double, IResult,
    };

    use super::Quantity;

    pub fn quantity(input: &str) -> IResult<&str, Quantity> {
        let (input, f) = double(input)?;
        let (input, _) = space0(input)?;
        let (input, u) = take_while(|c| is_alphanumeric(c as u8) || '_' == c)(input)?;
        let unit = if u.is_empty() {
            None
        } else {
            Some(u.to_string())
        };
        Ok((input, Quantity { value: f, unit }))
    }
}
