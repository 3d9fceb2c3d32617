//! Byte encodings of artifacts.
//!
//! Matrices are a little-endian `u64` row count and column count followed
//! by row-major `f64` values. Feature records are a `u32` stream count
//! followed by `(u32 name length, name, matrix)` per stream. Warp functions
//! are text, one `source target` pair per line.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, ArrayView2};
use nom::{
    IResult, Parser,
    character::complete::{line_ending, multispace0, space0, space1, u64 as decimal},
    combinator::{eof, map, opt},
    multi::many0,
    sequence::{preceded, separated_pair, terminated},
};

use crate::{
    align::TimeWarpFunction,
    error::{Result, VcError},
};

use super::record::FeatureRecord;

pub fn write_matrix(mut writer: impl Write, matrix: ArrayView2<f64>) -> std::io::Result<()> {
    writer.write_u64::<LittleEndian>(matrix.nrows() as u64)?;
    writer.write_u64::<LittleEndian>(matrix.ncols() as u64)?;
    for value in matrix.iter() {
        writer.write_f64::<LittleEndian>(*value)?;
    }
    Ok(())
}

pub fn read_matrix(mut reader: impl Read) -> std::io::Result<Array2<f64>> {
    let rows = reader.read_u64::<LittleEndian>()? as usize;
    let cols = reader.read_u64::<LittleEndian>()? as usize;
    let values = (0..rows.saturating_mul(cols))
        .map(|_| reader.read_f64::<LittleEndian>())
        .collect::<std::io::Result<Vec<_>>>()?;
    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

pub fn encode_matrix(matrix: ArrayView2<f64>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16 + 8 * matrix.len());
    // writing into a Vec cannot fail
    let _ = write_matrix(&mut bytes, matrix);
    bytes
}

pub fn encode_record(record: &FeatureRecord) -> Vec<u8> {
    let mut bytes = Vec::new();
    let _ = write_record(&mut bytes, record);
    bytes
}

fn write_record(mut writer: impl Write, record: &FeatureRecord) -> std::io::Result<()> {
    writer.write_u32::<LittleEndian>(record.len() as u32)?;
    for (name, stream) in record.iter() {
        writer.write_u32::<LittleEndian>(name.len() as u32)?;
        writer.write_all(name.as_bytes())?;
        write_matrix(&mut writer, stream)?;
    }
    Ok(())
}

pub fn read_record(mut reader: impl Read) -> std::io::Result<FeatureRecord> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut record = FeatureRecord::new();
    for _ in 0..count {
        let length = reader.read_u32::<LittleEndian>()? as usize;
        let mut name = vec![0; length];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let stream = read_matrix(&mut reader)?;
        record.insert(name, stream);
    }
    Ok(record)
}

pub fn format_twf(twf: &TimeWarpFunction) -> String {
    twf.pairs()
        .iter()
        .map(|(s, t)| format!("{s} {t}\n"))
        .collect()
}

fn twf_row(i: &str) -> IResult<&str, (usize, usize)> {
    map(
        terminated(
            separated_pair(decimal, space1, decimal),
            (space0, opt(line_ending)),
        ),
        |(s, t)| (s as usize, t as usize),
    )
    .parse(i)
}

pub fn parse_twf(text: &str) -> Result<TimeWarpFunction> {
    let (_, pairs) = terminated(many0(preceded(multispace0, twf_row)), (multispace0, eof))
        .parse(text)
        .map_err(|e: nom::Err<nom::error::Error<&str>>| VcError::TextParse(e.to_string()))?;
    Ok(TimeWarpFunction::new(pairs))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use crate::{align::TimeWarpFunction, store::record::FeatureRecord};

    use super::{encode_matrix, encode_record, format_twf, parse_twf, read_matrix, read_record};

    #[test]
    fn matrix_layout() {
        let matrix = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let bytes = encode_matrix(matrix.view());
        assert_eq!(bytes.len(), 16 + 6 * 8);
        assert_eq!(&bytes[..8], &3u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[24..32], &2.0f64.to_le_bytes());
        assert_eq!(read_matrix(&bytes[..]).unwrap(), matrix);
        assert!(read_matrix(&bytes[..20]).is_err());
    }

    #[test]
    fn record() {
        let mut record = FeatureRecord::new();
        record
            .insert_scalar("f0", &[0.0, 110.0])
            .insert("mcep", Array2::from_elem((2, 3), 0.5));
        let decoded = read_record(&encode_record(&record)[..]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn twf_text() {
        let twf = TimeWarpFunction::new(vec![(0, 0), (0, 1), (1, 2)]);
        let text = format_twf(&twf);
        assert_eq!(text, "0 0\n0 1\n1 2\n");
        assert_eq!(parse_twf(&text).unwrap(), twf);
        assert_eq!(parse_twf("0 0\r\n1   1  \n\n").unwrap(), TimeWarpFunction::identity(2));
        assert_eq!(parse_twf("").unwrap(), TimeWarpFunction::default());
        assert!(parse_twf("0 0\n1 x\n").is_err());
    }
}
