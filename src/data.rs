use std::fs::write;
use std::path::Path;

use crate::error::{Error, Result};

fn data_error<T: Into<String>>(what: T) -> Error {
    Error::Data { what: what.into() }
}

/// Column-wise numeric table as produced by a LEMS OutputFile: whitespace
/// separated floats, one sample per row, no header.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Vec<f64>>,
}

impl Table {
    pub fn parse(input: &str, ncols: usize, origin: &str) -> Result<Self> {
        if 0 == ncols {
            return Err(data_error(format!(
                "Expected at least one column in '{}'",
                origin
            )));
        }
        let mut columns = vec![Vec::new(); ncols];
        for (ix, line) in input.lines().enumerate() {
            let row = line.trim();
            if row.is_empty() {
                continue;
            }
            let fields = row.split_whitespace().collect::<Vec<_>>();
            if fields.len() != ncols {
                return Err(data_error(format!(
                    "Expected {} columns, found {} in '{}' line {}",
                    ncols,
                    fields.len(),
                    origin,
                    ix + 1
                )));
            }
            for (col, field) in columns.iter_mut().zip(fields.iter()) {
                let value = field.parse::<f64>().map_err(|_| {
                    data_error(format!(
                        "Malformed number '{}' in '{}' line {}",
                        field,
                        origin,
                        ix + 1
                    ))
                })?;
                col.push(value);
            }
        }
        if columns[0].is_empty() {
            return Err(data_error(format!("No data rows in '{}'", origin)));
        }
        Ok(Table { columns })
    }

    pub fn read(path: &Path, ncols: usize) -> Result<Self> {
        let origin = path.to_string_lossy().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|_| data_error(format!("Could not read data file '{}'", origin)))?;
        Self::parse(&raw, ncols, &origin)
    }

    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns[0].is_empty()
    }
}

/// Sampled time series, times and values in lockstep.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub t: Vec<f64>,
    pub x: Vec<f64>,
}

impl Trace {
    pub fn new(t: Vec<f64>, x: Vec<f64>) -> Result<Self> {
        if t.len() != x.len() {
            return Err(data_error(format!(
                "Time and value series differ in length: {} vs {}",
                t.len(),
                x.len()
            )));
        }
        Ok(Trace { t, x })
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.t.iter().cloned().zip(self.x.iter().cloned())
    }

    /// Same series with all times multiplied by `f`, eg 1000 for s to ms.
    pub fn scale_time(&self, f: f64) -> Self {
        Trace {
            t: self.t.iter().map(|t| t * f).collect(),
            x: self.x.clone(),
        }
    }

    /// Prefix of the series up to and including time `t_end`. Times must
    /// ascend.
    pub fn clip(&self, t_end: f64) -> Self {
        let n = self.t.iter().take_while(|t| **t <= t_end).count();
        Trace {
            t: self.t[..n].to_vec(),
            x: self.x[..n].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// Two column output in the fixed point form downstream plotting tools expect.
pub fn write_xy(path: &Path, points: &[(f64, f64)]) -> Result<()> {
    let mut out = String::new();
    for (x, y) in points {
        out.push_str(&format!("{:.6}\t{:.6}\n", x, y));
    }
    write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_table() {
        let table = Table::parse("0 0.5\n0.01 0.25\n0.02 0.125\n", 2, "test.dat").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns[0], vec![0.0, 0.01, 0.02]);
        assert_eq!(table.columns[1], vec![0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_parse_table_skips_blank_lines() {
        let table = Table::parse("0 1\n\n  \n0.01 2\n", 2, "test.dat").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_parse_table_ragged_row() {
        let err = Table::parse("0 1\n0.01\n", 2, "test.dat").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(err.to_string().contains("test.dat"));
    }

    #[test]
    fn test_parse_table_malformed_number() {
        let err = Table::parse("0 1\n0.01 fish\n", 2, "test.dat").unwrap_err();
        assert!(err.to_string().contains("fish"));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_table_empty() {
        assert!(Table::parse("", 2, "test.dat").is_err());
        assert!(Table::parse("0 1\n", 0, "test.dat").is_err());
    }

    #[test]
    fn test_trace() {
        let trace = Trace::new(vec![0.0, 0.001], vec![1.0, 2.0]).unwrap();
        let ms = trace.scale_time(1000.0);
        assert_eq!(ms.t, vec![0.0, 1.0]);
        assert_eq!(ms.x, vec![1.0, 2.0]);
        assert_eq!(
            ms.iter().collect::<Vec<_>>(),
            vec![(0.0, 1.0), (1.0, 2.0)]
        );
        assert!(Trace::new(vec![0.0], vec![]).is_err());
    }

    #[test]
    fn test_trace_clip() {
        let trace = Trace::new(vec![0.0, 1.0, 2.0, 3.0], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let head = trace.clip(2.0);
        assert_eq!(head.t, vec![0.0, 1.0, 2.0]);
        assert_eq!(head.x, vec![5.0, 6.0, 7.0]);
        assert_eq!(trace.clip(10.0), trace);
        assert!(trace.clip(-1.0).is_empty());
    }

    #[test]
    fn test_write_xy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.dat");
        write_xy(&path, &[(-100.0, 0.0), (-80.0, 0.0315)]).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "-100.000000\t0.000000\n-80.000000\t0.031500\n");
    }
}
