use super::*;
use winnow::{
    ModalResult, Parser,
    ascii::dec_uint,
    combinator::{alt, preceded, terminated},
    stream::AsChar,
    token::take_while,
};

fn parse_ipn(input: &mut &str) -> ModalResult<Eid> {
    (dec_uint, preceded(".", dec_uint))
        .map(|(node_number, service_number)| Eid::Ipn {
            node_number,
            service_number,
        })
        .parse_next(input)
}

fn parse_regname(input: &mut &str) -> ModalResult<Box<str>> {
    take_while(
        1..,
        (
            AsChar::is_alphanum,
            '-',
            '.',
            '_',
            '~',
            '!',
            '$',
            '&',
            '\'',
            '(',
            ')',
            '*',
            '+',
            ',',
            ';',
            '=',
            '%',
        ),
    )
    .try_map(|v: &str| urlencoding::decode(v).map(|s| s.into_owned().into()))
    .parse_next(input)
}

fn parse_dtn_parts(input: &mut &str) -> ModalResult<Eid> {
    (
        terminated(parse_regname, "/"),
        take_while(0.., '\x21'..='\x7e'),
    )
        .map(|(node_name, demux): (Box<str>, &str)| Eid::Dtn {
            node_name,
            demux: demux.into(),
        })
        .parse_next(input)
}

pub(super) fn parse_dtn(input: &mut &str) -> ModalResult<Eid> {
    alt(("none".map(|_| Eid::Null), preceded("//", parse_dtn_parts))).parse_next(input)
}

pub(super) fn parse_eid(input: &mut &str) -> ModalResult<Eid> {
    alt((preceded("dtn:", parse_dtn), preceded("ipn:", parse_ipn))).parse_next(input)
}

impl std::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_eid
            .parse(s)
            .map_err(|e| EidError::ParseError(e.to_string()))
    }
}

impl TryFrom<&str> for Eid {
    type Error = EidError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
