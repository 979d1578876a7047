//! Reading delimiter-separated observation tables.
//!
//! The parser streams fields through `csv_core`, so quoting and embedded
//! separators behave the way every other CSV consumer expects, and empty
//! fields are skipped so runs of whitespace work as a separator too. The
//! result is always the variable-major layout the counter wants, whichever
//! way the file is oriented.

use crate::comm::Communicator;
use crate::Error;
use csv_core::{ReadFieldResult, ReaderBuilder};
use std::mem::take;
use std::path::Path;
use std::str;

/// How to interpret the table file.
pub struct ReaderOptions {
    /// Field separator byte.
    pub separator: u8,
    /// The first record (or field, with `col_obs`) holds variable names.
    pub var_names: bool,
    /// The first field (or record, with `col_obs`) holds observation indices.
    pub obs_indices: bool,
    /// Observations are columns; the file has one record per variable.
    pub col_obs: bool,
    /// Each rank stores only its contiguous observation slice while parsing;
    /// the slices are allgathered so every rank ends with the full table.
    pub parallel_read: bool,
}

/// Reads a table of `n` variables × `m` observations from `path`.
///
/// Returns the variable names (synthesized as `V0`…`Vn-1` when the file has
/// none) and the variable-major data.
pub fn read_table(
    path: &Path,
    n: usize,
    m: usize,
    options: &ReaderOptions,
    comm: &dyn Communicator,
) -> Result<(Vec<String>, Vec<u8>), Error> {
    let bytes = std::fs::read(path)?;
    parse_table(&bytes, n, m, options, comm)
}

/// [`read_table`] over an in-memory buffer.
pub fn parse_table(
    bytes: &[u8],
    n: usize,
    m: usize,
    options: &ReaderOptions,
    comm: &dyn Communicator,
) -> Result<(Vec<String>, Vec<u8>), Error> {
    let mut records = split_records(bytes, options.separator)?;

    let names;
    let mut data = vec![0u8; n * m];
    if options.col_obs {
        if options.obs_indices {
            if records.is_empty() {
                return Err(Error::ShapeMismatch {
                    axis: "records",
                    expected: n + 1,
                    found: 0,
                });
            }
            records.remove(0);
        }
        if records.len() != n {
            return Err(Error::ShapeMismatch {
                axis: "records",
                expected: n,
                found: records.len(),
            });
        }
        let mut parsed_names = Vec::with_capacity(n);
        for (v, record) in records.iter_mut().enumerate() {
            let mut fields = take(record);
            if options.var_names {
                if fields.is_empty() {
                    return Err(Error::ShapeMismatch {
                        axis: "fields",
                        expected: m + 1,
                        found: 0,
                    });
                }
                parsed_names.push(fields.remove(0));
            }
            if fields.len() != m {
                return Err(Error::ShapeMismatch {
                    axis: "fields",
                    expected: m,
                    found: fields.len(),
                });
            }
            for (j, field) in fields.iter().enumerate() {
                data[v * m + j] = parse_cell(field, v)?;
            }
        }
        names = finish_names(parsed_names, n);
    } else {
        let header = if options.var_names {
            if records.is_empty() {
                return Err(Error::ShapeMismatch {
                    axis: "records",
                    expected: m + 1,
                    found: 0,
                });
            }
            let mut header = records.remove(0);
            // An index column may or may not have a heading of its own.
            if options.obs_indices && header.len() == n + 1 {
                header.remove(0);
            }
            header
        } else {
            Vec::new()
        };
        if records.len() != m {
            return Err(Error::ShapeMismatch {
                axis: "records",
                expected: m,
                found: records.len(),
            });
        }
        for (j, record) in records.iter_mut().enumerate() {
            let mut fields = take(record);
            if options.obs_indices && !fields.is_empty() {
                fields.remove(0);
            }
            if fields.len() != n {
                return Err(Error::ShapeMismatch {
                    axis: "fields",
                    expected: n,
                    found: fields.len(),
                });
            }
            for (v, field) in fields.iter().enumerate() {
                data[v * m + j] = parse_cell(field, j)?;
            }
        }
        names = finish_names(header, n);
    }

    if options.parallel_read && comm.size() > 1 {
        data = exchange_slices(&data, n, m, comm);
    }
    Ok((names, data))
}

fn finish_names(parsed: Vec<String>, n: usize) -> Vec<String> {
    if parsed.is_empty() {
        (0..n).map(|v| format!("V{}", v)).collect()
    } else {
        parsed
    }
}

fn parse_cell(field: &str, record: usize) -> Result<u8, Error> {
    let value: u32 = field.parse().map_err(|_| Error::MalformedCell {
        value: field.to_string(),
        record,
    })?;
    u8::try_from(value).map_err(|_| Error::CellOutOfRange { value, record })
}

/// Splits the input into records of non-empty fields. Empty records (blank
/// lines) are dropped.
fn split_records(bytes: &[u8], separator: u8) -> Result<Vec<Vec<String>>, Error> {
    let mut reader = ReaderBuilder::new().delimiter(separator).build();
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut fieldbuf = vec![0u8; 1024];
    let mut fieldlen = 0;
    let mut input = bytes;
    loop {
        let (result, consumed, written) = reader.read_field(input, &mut fieldbuf[fieldlen..]);
        input = &input[consumed..];
        fieldlen += written;
        match result {
            ReadFieldResult::InputEmpty => continue,
            ReadFieldResult::OutputFull => {
                let len = fieldbuf.len();
                fieldbuf.resize(len * 2, 0);
            }
            ReadFieldResult::Field { record_end } => {
                let field = str::from_utf8(&fieldbuf[..fieldlen]).map_err(|_| {
                    Error::MalformedCell {
                        value: String::from_utf8_lossy(&fieldbuf[..fieldlen]).into_owned(),
                        record: records.len(),
                    }
                })?;
                fieldlen = 0;
                let field = field.trim();
                if !field.is_empty() {
                    record.push(field.to_string());
                }
                if record_end && !record.is_empty() {
                    records.push(take(&mut record));
                }
            }
            ReadFieldResult::End => return Ok(records),
        }
    }
}

/// Keeps only this rank's contiguous observation slice and allgathers the
/// slices back into the full table, identically on every rank.
fn exchange_slices(data: &[u8], n: usize, m: usize, comm: &dyn Communicator) -> Vec<u8> {
    let size = comm.size();
    let range = |r: usize| (r * m / size, (r + 1) * m / size);
    let (lo, hi) = range(comm.rank());
    let mut slice = Vec::with_capacity(n * (hi - lo));
    for v in 0..n {
        slice.extend_from_slice(&data[v * m + lo..v * m + hi]);
    }
    let gathered = comm.allgather_bytes(&slice);
    let mut full = vec![0u8; n * m];
    for (r, payload) in gathered.iter().enumerate() {
        let (lo, hi) = range(r);
        let width = hi - lo;
        for v in 0..n {
            full[v * m + lo..v * m + hi].copy_from_slice(&payload[v * width..(v + 1) * width]);
        }
    }
    full
}
