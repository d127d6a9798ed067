//! Compact binary persistence: bincode (serde) encoded, LZ4 compressed with
//! the uncompressed size prepended.
use std::io::Write;

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::SGError;

pub fn write_buffer<T: Serialize>(data: &T) -> Result<Vec<u8>, SGError>
{
    let bytes = bincode::serde::encode_to_vec(data, bincode::config::standard()).map_err(|_|SGError::SerializationFailed)?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

pub fn read_buffer<T: DeserializeOwned>(buffer: &[u8]) -> Result<T, SGError>
{
    let buffer = lz4_flex::decompress_size_prepended(buffer).map_err(|_|SGError::LZ4DecompressionFailed)?;
    let (data, _) = bincode::serde::decode_from_slice(&buffer, bincode::config::standard()).map_err(|_|SGError::DeserializationFailed)?;
    Ok(data)
}

pub fn read<T: DeserializeOwned, Reader: std::io::Read>(mut reader: Reader) -> Result<T, SGError>
{
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(|_|SGError::ReadBufferFailed)?;
    read_buffer(&bytes)
}

pub fn save<T: Serialize>(data: &T, path: &str) -> Result<(), SGError>
{
    let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_|SGError::FileIOError)?);
    let buffer = write_buffer(data)?;
    file.write_all(&buffer).map_err(|_|SGError::WriteBufferFailed)?;
    file.flush().map_err(|_|SGError::WriteBufferFailed)?;
    tracing::debug!(path, bytes = buffer.len(), "saved");
    Ok(())
}

#[test]
fn check_corrupt_buffer()
{
    let buffer = write_buffer(&vec![1.0_f64, 2.0, 3.0]).unwrap();
    assert_eq!(read_buffer::<Vec<f64>>(&buffer).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(read_buffer::<Vec<f64>>(&buffer[..2]).unwrap_err(), SGError::LZ4DecompressionFailed);
}
