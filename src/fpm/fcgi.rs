//! Minimal FastCGI client framing.
//!
//! Only what a single status request needs: one responder request with
//! params and an empty stdin, then records read back until `END_REQUEST`.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ScrapeError;

pub const VERSION_1: u8 = 1;
pub const HEADER_LEN: usize = 8;

pub const BEGIN_REQUEST: u8 = 1;
pub const END_REQUEST: u8 = 3;
pub const PARAMS: u8 = 4;
pub const STDIN: u8 = 5;
pub const STDOUT: u8 = 6;
pub const STDERR: u8 = 7;

const ROLE_RESPONDER: u16 = 1;
const MAX_CONTENT_LEN: usize = 65535;

/// A single decoded FastCGI record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: u8,
    pub request_id: u16,
    pub content: Vec<u8>,
}

/// Output collected for one request.
#[derive(Debug, Default)]
pub struct Response {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub app_status: u32,
}

fn write_header(out: &mut Vec<u8>, kind: u8, request_id: u16, len: u16, padding: u8) {
    out.push(VERSION_1);
    out.push(kind);
    out.extend_from_slice(&request_id.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.push(padding);
    out.push(0);
}

/// Appends `content` as one or more records of `kind`, padded to 8 bytes.
/// Empty content produces a single zero-length record (stream terminator).
pub fn encode_record(out: &mut Vec<u8>, kind: u8, request_id: u16, content: &[u8]) {
    if content.is_empty() {
        write_header(out, kind, request_id, 0, 0);
        return;
    }

    for chunk in content.chunks(MAX_CONTENT_LEN) {
        let padding = (8 - chunk.len() % 8) % 8;
        write_header(out, kind, request_id, chunk.len() as u16, padding as u8);
        out.extend_from_slice(chunk);
        out.resize(out.len() + padding, 0);
    }
}

fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 128 {
        out.push(len as u8);
    } else {
        out.extend_from_slice(&((len as u32) | 0x8000_0000).to_be_bytes());
    }
}

/// Encodes name-value pairs for a `PARAMS` stream.
pub fn encode_params(params: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in params {
        encode_length(&mut out, name.len());
        encode_length(&mut out, value.len());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Builds the complete byte sequence for a responder request without body.
pub fn encode_request(request_id: u16, params: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);

    let role = ROLE_RESPONDER.to_be_bytes();
    // flags = 0: the server closes the connection after the response
    let begin = [role[0], role[1], 0, 0, 0, 0, 0, 0];
    encode_record(&mut out, BEGIN_REQUEST, request_id, &begin);

    encode_record(&mut out, PARAMS, request_id, &encode_params(params));
    encode_record(&mut out, PARAMS, request_id, &[]);
    encode_record(&mut out, STDIN, request_id, &[]);
    out
}

/// Reads one record, consuming its padding.
pub async fn read_record<R>(reader: &mut R) -> Result<Record, ScrapeError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    if header[0] != VERSION_1 {
        return Err(ScrapeError::Protocol(format!(
            "unsupported FastCGI version {}",
            header[0]
        )));
    }

    let request_id = u16::from_be_bytes([header[2], header[3]]);
    let len = u16::from_be_bytes([header[4], header[5]]) as usize;
    let padding = header[6] as usize;

    let mut content = vec![0u8; len];
    reader.read_exact(&mut content).await?;

    if padding > 0 {
        let mut pad = [0u8; 255];
        reader.read_exact(&mut pad[..padding]).await?;
    }

    Ok(Record {
        kind: header[1],
        request_id,
        content,
    })
}

/// Collects stdout/stderr for `request_id` until its `END_REQUEST` arrives.
pub async fn read_response<R>(reader: &mut R, request_id: u16) -> Result<Response, ScrapeError>
where
    R: AsyncRead + Unpin,
{
    let mut response = Response::default();

    loop {
        let record = read_record(reader).await?;
        if record.request_id != request_id {
            continue;
        }

        match record.kind {
            STDOUT => response.stdout.extend_from_slice(&record.content),
            STDERR => response.stderr.extend_from_slice(&record.content),
            END_REQUEST => {
                if record.content.len() < 8 {
                    return Err(ScrapeError::Protocol(
                        "short END_REQUEST record".to_string(),
                    ));
                }
                let protocol_status = record.content[4];
                if protocol_status != 0 {
                    return Err(ScrapeError::Protocol(format!(
                        "request rejected with protocol status {protocol_status}"
                    )));
                }
                response.app_status = u32::from_be_bytes([
                    record.content[0],
                    record.content[1],
                    record.content[2],
                    record.content[3],
                ]);
                return Ok(response);
            }
            _ => continue,
        }
    }
}

/// Helpers for playing the server side in tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn decode_params(mut content: &[u8]) -> Vec<(String, String)> {
        fn length(buf: &mut &[u8]) -> usize {
            if buf[0] & 0x80 == 0 {
                let len = buf[0] as usize;
                *buf = &buf[1..];
                len
            } else {
                let len = u32::from_be_bytes([buf[0] & 0x7f, buf[1], buf[2], buf[3]]) as usize;
                *buf = &buf[4..];
                len
            }
        }

        let mut params = Vec::new();
        while !content.is_empty() {
            let name_len = length(&mut content);
            let value_len = length(&mut content);
            let name = String::from_utf8_lossy(&content[..name_len]).into_owned();
            let value = String::from_utf8_lossy(&content[name_len..name_len + value_len]).into_owned();
            content = &content[name_len + value_len..];
            params.push((name, value));
        }
        params
    }

    pub fn encode_stdout_response(request_id: u16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_record(&mut out, STDOUT, request_id, body);
        encode_record(&mut out, STDOUT, request_id, &[]);
        encode_record(&mut out, END_REQUEST, request_id, &[0, 0, 0, 0, 0, 0, 0, 0]);
        out
    }
}
