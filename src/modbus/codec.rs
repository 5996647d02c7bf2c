// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder as _};
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{
    ExceptionCode, ExceptionResponse, FunctionCode, Header, RequestAdu, Response, ResponseAdu,
    ResponsePdu,
};
use crate::bytes::{BufMut as _, Bytes, BytesMut};

const HEADER_LEN: usize = 7;

const PROTOCOL_ID: u16 = 0x0000; // TCP

/// Maximum request/response PDU size.
const MAX_PDU_SIZE: usize = 253;

/// Length of a read request PDU: function code, address and quantity.
const REQUEST_PDU_LEN: u16 = 5;

/// MBAP framing of read requests and their responses.
#[derive(Debug, Default)]
pub(crate) struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<ResponseAdu>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let transaction_id = BigEndian::read_u16(&buf[0..2]);
        let protocol_id = BigEndian::read_u16(&buf[2..4]);
        // len = bytes of PDU + one byte (unit ID)
        let len = usize::from(BigEndian::read_u16(&buf[4..6]));
        let unit_id = buf[6];

        if protocol_id != PROTOCOL_ID {
            return Err(Error::new(ErrorKind::InvalidData, "Invalid protocol ID"));
        }
        if len < 2 || len - 1 > MAX_PDU_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid MBAP length: {len}"),
            ));
        }

        let adu_len = HEADER_LEN - 1 + len;
        if buf.len() < adu_len {
            buf.reserve(adu_len - buf.len());
            return Ok(None);
        }

        let mut adu = buf.split_to(adu_len);
        let pdu = adu.split_off(HEADER_LEN).freeze();
        let hdr = Header {
            transaction_id,
            unit_id,
        };
        let pdu = decode_response_pdu(pdu)?;
        Ok(Some(ResponseAdu { hdr, pdu }))
    }
}

fn decode_response_pdu(pdu: Bytes) -> io::Result<ResponsePdu> {
    let function = pdu[0];
    if function & 0x80 != 0 {
        let exception = *pdu
            .get(1)
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Missing exception code"))?;
        return Ok(ResponsePdu(Err(ExceptionResponse {
            function: function & 0x7F,
            exception: ExceptionCode::new(exception),
        })));
    }
    let function = FunctionCode::new(function).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidData,
            format!("Unexpected function code: 0x{function:02X}"),
        )
    })?;
    let byte_count = usize::from(
        *pdu.get(1)
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Missing byte count"))?,
    );
    if pdu.len() != 2 + byte_count {
        return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
    }
    Ok(ResponsePdu(Ok(Response {
        function,
        data: pdu.slice(2..),
    })))
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> io::Result<()> {
        let RequestAdu { hdr, pdu } = adu;
        buf.reserve(HEADER_LEN + usize::from(REQUEST_PDU_LEN));
        buf.put_u16(hdr.transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16(REQUEST_PDU_LEN + 1);
        buf.put_u8(hdr.unit_id);
        buf.put_u8(pdu.function.value());
        buf.put_u16(pdu.address);
        buf.put_u16(pdu.quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::frame::Request;

    #[test]
    fn decode_header_fragment() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(&[0x00, 0x11, 0x00, 0x00, 0x00, 0x00][..]);
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn decode_partly_received_message() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, // transaction id HI
                0x11, // transaction id LO
                0x00, // protocol id HI
                0x00, // protocol id LO
                0x00, // length HI
                0x05, // length LO
                0x66, // unit id
                0x03, // function code
                0x02, // byte count
            ][..],
        );
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn decode_read_response() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, 0x2A, // transaction id
                0x00, 0x00, // protocol id
                0x00, 0x05, // length
                0x01, // unit id
                0x03, // function code
                0x02, // byte count
                0x00, 0xD7, // register
                0x00, // next frame
            ][..],
        );
        let adu = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(buf.len(), 1);
        assert_eq!(
            adu.hdr,
            Header {
                transaction_id: 42,
                unit_id: 1,
            }
        );
        assert_eq!(
            adu.pdu,
            ResponsePdu(Ok(Response {
                function: FunctionCode::ReadHoldingRegisters,
                data: Bytes::from_static(&[0x00, 0xD7]),
            }))
        );
    }

    #[test]
    fn decode_exception_message() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x66, 0x82, // exception = 0x80 + 0x02
                0x02, 0x00,
            ][..],
        );
        let adu = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(buf.len(), 1);
        assert_eq!(
            adu.pdu,
            ResponsePdu(Err(ExceptionResponse {
                function: 0x02,
                exception: ExceptionCode::IllegalDataAddress,
            }))
        );
    }

    #[test]
    fn decode_with_invalid_protocol_id() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, 0x00, 0x33, // protocol id HI
                0x12, // protocol id LO
                0x00, 0x03, 0x66, 0x82, 0x03, 0x00,
            ][..],
        );
        let err = codec.decode(&mut buf).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(format!("{err}"), "Invalid protocol ID");
    }

    #[test]
    fn decode_with_invalid_byte_count() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x04, 0x02, 0x00][..]);
        let err = codec.decode(&mut buf).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn decode_unexpected_function_code() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x01, 0x2B, 0x00][..]);
        let err = codec.decode(&mut buf).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn encode_read_request() {
        let mut codec = ClientCodec;
        let mut buf = BytesMut::new();
        let adu = RequestAdu {
            hdr: Header {
                transaction_id: 0x0102,
                unit_id: 0x20,
            },
            pdu: Request {
                function: FunctionCode::ReadInputRegisters,
                address: 0x23,
                quantity: 5,
            },
        };
        codec.encode(adu, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x20, 0x04, 0x00, 0x23, 0x00, 0x05]
        );
    }
}
