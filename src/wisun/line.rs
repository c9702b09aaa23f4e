// SKSTACK/IP 応答行の分類
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{hex_digit1, space1};
use nom::combinator::{map, map_res, opt};
use nom::multi::{many1, separated_list1};
use nom::sequence::preceded;
use nom::{IResult, Parser};
use std::net::Ipv6Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: u8,
    pub sender: Option<Ipv6Addr>,
    pub param: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erxudp {
    pub sender: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub rport: u16,
    pub lport: u16,
    pub senderlla: u64,
    pub secured: u8,
    pub datalen: u16,
    pub data: Vec<u8>,
}

/// 一行分のSKSTACK/IP応答を分類した結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxLine {
    Ok,
    Fail(u8),
    Error(String),
    Event(Event),
    Erxudp(Erxudp),
    /// `  Addr:...` のような EPANDESC/SKLL64 の断片行
    Field(String, String),
    Ever(String),
    /// 応答として意味のある構造を持たない行(単独のIPv6アドレス等)
    Other(String),
}

fn u8_hex(input: &str) -> IResult<&str, u8> {
    map_res(hex_digit1, |s| u8::from_str_radix(s, 16)).parse(input)
}

fn u16_hex(input: &str) -> IResult<&str, u16> {
    map_res(hex_digit1, |s| u16::from_str_radix(s, 16)).parse(input)
}

fn u64_hex(input: &str) -> IResult<&str, u64> {
    map_res(hex_digit1, |s| u64::from_str_radix(s, 16)).parse(input)
}

fn ipv6addr(input: &str) -> IResult<&str, Ipv6Addr> {
    let (rest, groups) = separated_list1(tag(":"), hex_digit1).parse(input)?;
    groups
        .join(":")
        .parse::<Ipv6Addr>()
        .map(|addr| (rest, addr))
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify)))
}

fn rx_ok(input: &str) -> IResult<&str, RxLine> {
    map(tag("OK"), |_| RxLine::Ok).parse(input)
}

fn rx_fail(input: &str) -> IResult<&str, RxLine> {
    map(preceded((tag("FAIL"), space1, tag("ER")), u8_hex), RxLine::Fail).parse(input)
}

fn rx_error(input: &str) -> IResult<&str, RxLine> {
    map(preceded((tag("ERROR"), opt(space1)), take_while1(|_| true)), |s: &str| {
        RxLine::Error(s.to_string())
    })
    .parse(input)
}

fn rx_ever(input: &str) -> IResult<&str, RxLine> {
    map(preceded((tag("EVER"), space1), take_while1(|_| true)), |s: &str| {
        RxLine::Ever(s.to_string())
    })
    .parse(input)
}

fn rx_event(input: &str) -> IResult<&str, RxLine> {
    let (input, _) = (tag("EVENT"), space1).parse(input)?;
    let (input, code) = u8_hex(input)?;
    let (input, sender) = opt(preceded(space1, ipv6addr)).parse(input)?;
    let (input, param) = opt(preceded(space1, u8_hex)).parse(input)?;
    Ok((input, RxLine::Event(Event { code, sender, param })))
}

fn hex_byte_pair(input: &str) -> IResult<&str, u8> {
    map_res(nom::bytes::complete::take(2usize), |s: &str| u8::from_str_radix(s, 16)).parse(input)
}

fn rx_erxudp(input: &str) -> IResult<&str, RxLine> {
    let (input, _) = (tag("ERXUDP"), space1).parse(input)?;
    let (input, sender) = ipv6addr(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, destination) = ipv6addr(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, rport) = u16_hex(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, lport) = u16_hex(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, senderlla) = u64_hex(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, secured) = u8_hex(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, datalen) = u16_hex(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, data) = many1(hex_byte_pair).parse(input)?;
    Ok((
        input,
        RxLine::Erxudp(Erxudp {
            sender,
            destination,
            rport,
            lport,
            senderlla,
            secured,
            datalen,
            data,
        }),
    ))
}

/// `  Addr:12345678ABCDABCD` や `  Channel:3B` のようなインデント付きフィールド行
fn rx_field(input: &str) -> IResult<&str, RxLine> {
    let (input, _) = nom::character::complete::space0.parse(input)?;
    let (input, key) = nom::bytes::complete::take_till1(|c| c == ':').parse(input)?;
    let (input, _) = tag(":").parse(input)?;
    let (input, value) = take_while1(|_| true).parse(input)?;
    Ok((input, RxLine::Field(key.trim().to_string(), value.to_string())))
}

/// 一行(CR/LF除去済み)を分類する
pub fn classify_line(line: &str) -> RxLine {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return RxLine::Other(String::new());
    }
    let parsers = alt((rx_ok, rx_fail, rx_error, rx_event, rx_erxudp, rx_ever, rx_field));
    match nom::combinator::all_consuming(parsers).parse(trimmed) {
        Ok((_, rxline)) => rxline,
        Err(_) => RxLine::Other(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ok_and_fail() {
        assert_eq!(classify_line("OK\r\n"), RxLine::Ok);
        assert_eq!(classify_line("FAIL ER10\r\n"), RxLine::Fail(0x10));
    }

    #[test]
    fn classifies_event_with_and_without_sender() {
        match classify_line("EVENT 25 FE80:0000:0000:0000:0000:0000:0000:0001\r\n") {
            RxLine::Event(e) => {
                assert_eq!(e.code, 0x25);
                assert!(e.sender.is_some());
                assert_eq!(e.param, None);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn classifies_erxudp() {
        let sender = "FE80:0001:0002:0003:0004:0005:0006:0007";
        let destination = "FE80:0008:0009:000a:000b:000c:000d:000e";
        let line = format!(
            "ERXUDP {} {} 02CC 02CC 123456789ABC0000 1 0004 DEADBEEF\r\n",
            sender, destination
        );
        match classify_line(&line) {
            RxLine::Erxudp(e) => {
                assert_eq!(e.sender, sender.parse::<Ipv6Addr>().unwrap());
                assert_eq!(e.destination, destination.parse::<Ipv6Addr>().unwrap());
                assert_eq!(e.rport, 0x02CC);
                assert_eq!(e.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn classifies_scan_fields() {
        assert_eq!(
            classify_line("  Addr:1234567890ABCDEF\r\n"),
            RxLine::Field("Addr".to_string(), "1234567890ABCDEF".to_string())
        );
        assert_eq!(
            classify_line("  Channel:3B\r\n"),
            RxLine::Field("Channel".to_string(), "3B".to_string())
        );
    }

    #[test]
    fn unparseable_line_is_other() {
        assert!(matches!(classify_line("some garbage\r\n"), RxLine::Other(_)));
    }
}
