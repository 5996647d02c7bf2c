// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ISO-on-TCP framing (RFC 1006)
//!
//! Every TPDU of the ISO transport protocol (COTP) is wrapped into a
//! TPKT header that carries the version and the total length.

use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder as _};
use tokio_util::codec::{Decoder, Encoder};

use crate::bytes::{BufMut as _, Bytes, BytesMut};

const TPKT_VERSION: u8 = 3;
const TPKT_HEADER_LEN: usize = 4;

/// Smallest valid TPKT: header plus length indicator and PDU type.
const MIN_TPKT_LEN: usize = TPKT_HEADER_LEN + 2;

const PDU_TYPE_CR: u8 = 0xE0; // Connection request
const PDU_TYPE_CC: u8 = 0xD0; // Connection confirm
const PDU_TYPE_DT: u8 = 0xF0; // Data transfer

const PDU_EOT: u8 = 0x80; // Last data unit

const SRC_REF: u16 = 0x0100;
const DST_REF: u16 = 0x0000;
const SRC_TSAP: u16 = 0x0100;

const PARAM_TPDU_SIZE: u8 = 0xC0;
const PARAM_SRC_TSAP: u8 = 0xC1;
const PARAM_DST_TSAP: u8 = 0xC2;

/// 1024 bytes
const TPDU_SIZE_1024: u8 = 0x0A;

/// Transport protocol data units used by the S7 driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tpdu {
    ConnectionRequest { dst_tsap: u16 },
    ConnectionConfirm,
    Data(Bytes),
}

/// Destination TSAP of a basic connection to the CPU in `rack` and `slot`.
pub(crate) fn dst_tsap(rack: u8, slot: u8) -> u16 {
    const CONNECTION_TYPE_BASIC: u16 = 0x03;
    (CONNECTION_TYPE_BASIC << 8) + u16::from(rack) * 0x20 + u16::from(slot)
}

/// Splits TPKTs and reassembles data units.
#[derive(Debug, Default)]
pub(crate) struct IsoCodec {
    fragments: BytesMut,
}

impl Decoder for IsoCodec {
    type Item = Tpdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Tpdu>> {
        loop {
            if buf.len() < TPKT_HEADER_LEN {
                return Ok(None);
            }
            if buf[0] != TPKT_VERSION {
                return Err(Error::new(ErrorKind::InvalidData, "Invalid TPKT version"));
            }
            let len = usize::from(BigEndian::read_u16(&buf[2..4]));
            if len < MIN_TPKT_LEN {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("Invalid TPKT length: {len}"),
                ));
            }
            if buf.len() < len {
                buf.reserve(len - buf.len());
                return Ok(None);
            }
            let tpkt = buf.split_to(len);
            let cotp = &tpkt[TPKT_HEADER_LEN..];
            let header_len = 1 + usize::from(cotp[0]);
            if cotp.len() < header_len {
                return Err(Error::new(ErrorKind::InvalidData, "COTP header truncated"));
            }
            match cotp[1] & 0xF0 {
                PDU_TYPE_CC => return Ok(Some(Tpdu::ConnectionConfirm)),
                PDU_TYPE_DT => {
                    if header_len < 3 {
                        return Err(Error::new(ErrorKind::InvalidData, "COTP header truncated"));
                    }
                    self.fragments.extend_from_slice(&cotp[header_len..]);
                    if cotp[2] & PDU_EOT != 0 {
                        let data = self.fragments.split().freeze();
                        return Ok(Some(Tpdu::Data(data)));
                    }
                    // More fragments to come
                }
                pdu_type => {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!("Unexpected COTP PDU type: 0x{pdu_type:02X}"),
                    ));
                }
            }
        }
    }
}

impl Encoder<Tpdu> for IsoCodec {
    type Error = Error;

    fn encode(&mut self, tpdu: Tpdu, buf: &mut BytesMut) -> io::Result<()> {
        match tpdu {
            Tpdu::ConnectionRequest { dst_tsap } => {
                let cotp_len = 18;
                buf.reserve(TPKT_HEADER_LEN + cotp_len);
                put_tpkt_header(buf, cotp_len);
                buf.put_u8(17); // length indicator
                buf.put_u8(PDU_TYPE_CR);
                buf.put_u16(DST_REF);
                buf.put_u16(SRC_REF);
                buf.put_u8(0x00); // class 0
                buf.put_slice(&[PARAM_TPDU_SIZE, 1, TPDU_SIZE_1024]);
                buf.put_slice(&[PARAM_SRC_TSAP, 2]);
                buf.put_u16(SRC_TSAP);
                buf.put_slice(&[PARAM_DST_TSAP, 2]);
                buf.put_u16(dst_tsap);
            }
            Tpdu::Data(data) => {
                let cotp_len = 3 + data.len();
                if TPKT_HEADER_LEN + cotp_len > usize::from(u16::MAX) {
                    return Err(Error::new(ErrorKind::InvalidInput, "TPDU too large"));
                }
                buf.reserve(TPKT_HEADER_LEN + cotp_len);
                put_tpkt_header(buf, cotp_len);
                buf.put_u8(2); // length indicator
                buf.put_u8(PDU_TYPE_DT);
                buf.put_u8(PDU_EOT);
                buf.put_slice(&data);
            }
            Tpdu::ConnectionConfirm => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "Connection confirms are only sent by the PLC",
                ));
            }
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn put_tpkt_header(buf: &mut BytesMut, cotp_len: usize) {
    buf.put_u8(TPKT_VERSION);
    buf.put_u8(0x00); // reserved
    buf.put_u16((TPKT_HEADER_LEN + cotp_len) as u16);
}
