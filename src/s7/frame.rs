// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! S7 communication PDUs

use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder as _};

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    driver::FieldData,
    DataType, FieldDescriptor, MemoryArea, ResponseCode,
};

const PROTOCOL_ID: u8 = 0x32;

const ROSCTR_JOB: u8 = 0x01;
const ROSCTR_ACK_DATA: u8 = 0x03;

const FUNCTION_READ_VAR: u8 = 0x04;
const FUNCTION_SETUP_COMMUNICATION: u8 = 0xF0;

const JOB_HEADER_LEN: usize = 10;
const ACK_DATA_HEADER_LEN: usize = 12;

const READ_VAR_PARAMS_LEN: usize = 2;
const READ_ITEM_LEN: usize = 12;
const DATA_ITEM_HEADER_LEN: usize = 4;

const SPEC_TYPE_READ_WRITE: u8 = 0x12;
const SYNTAX_ID_ANY_TYPE: u8 = 0x10;

const RETURN_CODE_SUCCESS: u8 = 0xFF;

/// Bit addresses are encoded with 3 bytes.
const MAX_BIT_ADDRESS: u32 = 0x00FF_FFFF;

const MAX_AMQ: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Area {
    ProcessInput = 0x81,
    ProcessOutput = 0x82,
    Merker = 0x83,
    DataBlock = 0x84,
}

impl Area {
    const fn for_memory_area(area: MemoryArea) -> Option<Self> {
        let area = match area {
            MemoryArea::Input => Self::ProcessInput,
            MemoryArea::Output => Self::ProcessOutput,
            MemoryArea::Memory => Self::Merker,
            MemoryArea::DataBlock => Self::DataBlock,
            _ => return None,
        };
        Some(area)
    }
}

/// Transport size of a request item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportSize {
    Bit = 0x01,
    Byte = 0x02,
}

/// Number of bytes a field occupies in the memory of the PLC.
///
/// S7 strings carry a header with their maximum and actual length.
pub(crate) fn memory_len(field: &FieldDescriptor) -> usize {
    match field.data_type() {
        DataType::String(len) => (usize::from(len) + 2) * usize::from(field.quantity()),
        _ => field.byte_len(),
    }
}

/// Addresses a field with the any-type syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadItem {
    transport_size: TransportSize,
    count: u16,
    db_number: u16,
    area: Area,
    bit_address: u32,
}

impl ReadItem {
    /// Single booleans are read as bits, everything else as a byte range.
    pub(crate) fn for_field(field: &FieldDescriptor) -> Result<Self, ResponseCode> {
        let area = Area::for_memory_area(field.area()).ok_or(ResponseCode::InvalidAddress)?;
        let db_number = match area {
            Area::DataBlock => field.block().ok_or(ResponseCode::InvalidAddress)?,
            _ => 0,
        };
        let bit_address = field
            .address()
            .checked_mul(8)
            .and_then(|address| address.checked_add(u32::from(field.bit().unwrap_or(0))))
            .filter(|address| *address <= MAX_BIT_ADDRESS)
            .ok_or(ResponseCode::InvalidAddress)?;
        let (transport_size, count, bit_address) =
            if field.data_type() == DataType::Bool && field.quantity() == 1 {
                (TransportSize::Bit, 1, bit_address)
            } else {
                let count =
                    u16::try_from(memory_len(field)).map_err(|_| ResponseCode::InvalidAddress)?;
                // Byte ranges always start at a byte boundary
                (TransportSize::Byte, count, bit_address & !0x07)
            };
        Ok(Self {
            transport_size,
            count,
            db_number,
            area,
            bit_address,
        })
    }

    /// Number of data bytes in the response.
    pub(crate) fn response_len(&self) -> usize {
        match self.transport_size {
            TransportSize::Bit => usize::from(self.count).div_ceil(8),
            TransportSize::Byte => usize::from(self.count),
        }
    }

    /// Size of the item within a request PDU.
    pub(crate) const fn request_size() -> usize {
        READ_ITEM_LEN
    }

    /// Size of the item within a response PDU, including padding.
    pub(crate) fn response_size(&self) -> usize {
        let len = self.response_len();
        DATA_ITEM_HEADER_LEN + len + len % 2
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(SPEC_TYPE_READ_WRITE);
        buf.put_u8(u8_len(READ_ITEM_LEN - 2));
        buf.put_u8(SYNTAX_ID_ANY_TYPE);
        buf.put_u8(self.transport_size as u8);
        buf.put_u16(self.count);
        buf.put_u16(self.db_number);
        buf.put_u8(self.area as u8);
        buf.put_uint(u64::from(self.bit_address), 3);
    }
}

/// Overhead of a read var job without items.
pub(crate) const READ_VAR_REQUEST_OVERHEAD: usize = JOB_HEADER_LEN + READ_VAR_PARAMS_LEN;

/// Overhead of a read var response without items.
pub(crate) const READ_VAR_RESPONSE_OVERHEAD: usize = ACK_DATA_HEADER_LEN + READ_VAR_PARAMS_LEN;

#[allow(clippy::cast_possible_truncation)]
fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because the callers
    // never exceed the negotiated PDU size.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

fn encode_job_header(buf: &mut BytesMut, pdu_ref: u16, params_len: usize) {
    buf.put_u8(PROTOCOL_ID);
    buf.put_u8(ROSCTR_JOB);
    buf.put_u16(0x0000); // reserved
    buf.put_u16(pdu_ref);
    buf.put_u16(u16_len(params_len));
    buf.put_u16(0); // data length
}

pub(crate) fn encode_setup_communication(pdu_ref: u16, pdu_size: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(JOB_HEADER_LEN + 8);
    encode_job_header(&mut buf, pdu_ref, 8);
    buf.put_u8(FUNCTION_SETUP_COMMUNICATION);
    buf.put_u8(0x00); // reserved
    buf.put_u16(MAX_AMQ); // calling
    buf.put_u16(MAX_AMQ); // called
    buf.put_u16(pdu_size);
    buf.freeze()
}

pub(crate) fn encode_read_var_request(pdu_ref: u16, items: &[ReadItem]) -> Bytes {
    let params_len = READ_VAR_PARAMS_LEN + items.len() * READ_ITEM_LEN;
    let mut buf = BytesMut::with_capacity(JOB_HEADER_LEN + params_len);
    encode_job_header(&mut buf, pdu_ref, params_len);
    buf.put_u8(FUNCTION_READ_VAR);
    buf.put_u8(u8_len(items.len()));
    for item in items {
        item.encode(&mut buf);
    }
    buf.freeze()
}

/// The acknowledgement of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AckData {
    pub(crate) pdu_ref: u16,
    pub(crate) params: Bytes,
    pub(crate) data: Bytes,
}

pub(crate) fn decode_ack_data(pdu: &Bytes) -> io::Result<AckData> {
    if pdu.len() < ACK_DATA_HEADER_LEN {
        return Err(Error::new(ErrorKind::InvalidData, "S7 header too short"));
    }
    if pdu[0] != PROTOCOL_ID {
        return Err(Error::new(ErrorKind::InvalidData, "Invalid S7 protocol ID"));
    }
    if pdu[1] != ROSCTR_ACK_DATA {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Unexpected S7 message type: 0x{:02X}", pdu[1]),
        ));
    }
    let pdu_ref = BigEndian::read_u16(&pdu[4..6]);
    let params_len = usize::from(BigEndian::read_u16(&pdu[6..8]));
    let data_len = usize::from(BigEndian::read_u16(&pdu[8..10]));
    let (error_class, error_code) = (pdu[10], pdu[11]);
    if error_class != 0 || error_code != 0 {
        return Err(Error::new(
            ErrorKind::Other,
            format!("S7 error: class = 0x{error_class:02X}, code = 0x{error_code:02X}"),
        ));
    }
    let params_end = ACK_DATA_HEADER_LEN + params_len;
    if pdu.len() < params_end + data_len {
        return Err(Error::new(ErrorKind::InvalidData, "S7 message truncated"));
    }
    Ok(AckData {
        pdu_ref,
        params: pdu.slice(ACK_DATA_HEADER_LEN..params_end),
        data: pdu.slice(params_end..params_end + data_len),
    })
}

/// Returns the negotiated PDU size.
pub(crate) fn decode_setup_communication(ack: &AckData) -> io::Result<u16> {
    let params = &ack.params;
    if params.len() < 8 || params[0] != FUNCTION_SETUP_COMMUNICATION {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "Invalid setup communication response",
        ));
    }
    Ok(BigEndian::read_u16(&params[6..8]))
}

pub(crate) fn decode_read_var_response(
    ack: &AckData,
    items: &[ReadItem],
) -> io::Result<Vec<FieldData>> {
    let params = &ack.params;
    if params.len() < READ_VAR_PARAMS_LEN || params[0] != FUNCTION_READ_VAR {
        return Err(Error::new(ErrorKind::InvalidData, "Invalid read var response"));
    }
    if usize::from(params[1]) != items.len() {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "Invalid item count: expected/request = {}, actual/response = {}",
                items.len(),
                params[1]
            ),
        ));
    }
    let data = &ack.data;
    let mut offset = 0;
    let mut results = Vec::with_capacity(items.len());
    for index in 0..items.len() {
        let header = data
            .get(offset..offset + DATA_ITEM_HEADER_LEN)
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Data item truncated"))?;
        let return_code = header[0];
        let len = usize::from(BigEndian::read_u16(&header[2..4]));
        let len = match header[1] {
            // length in bits
            0x03..=0x05 => len.div_ceil(8),
            _ => len,
        };
        offset += DATA_ITEM_HEADER_LEN;
        let value = data
            .get(offset..offset + len)
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Data item truncated"))?;
        results.push(if return_code == RETURN_CODE_SUCCESS {
            Ok(data.slice_ref(value))
        } else {
            Err(response_code(return_code))
        });
        offset += len;
        // All but the last item are padded to an even length
        if len % 2 != 0 && index + 1 < items.len() {
            offset += 1;
        }
    }
    Ok(results)
}

/// Maps the return code of a data item.
pub(crate) const fn response_code(return_code: u8) -> ResponseCode {
    match return_code {
        RETURN_CODE_SUCCESS => ResponseCode::Ok,
        // Address out of range
        0x05 => ResponseCode::InvalidAddress,
        // Object does not exist
        0x0A => ResponseCode::NotFound,
        _ => ResponseCode::RemoteError,
    }
}
