//! Line-delimited lists of utterance ids.

use std::{fs, path::Path, str::FromStr};

use crate::error::{Result, VcError};

/// Utterance ids of one speaker, one per non-empty line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtteranceList {
    ids: Vec<String>,
}

impl UtteranceList {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        fs::read_to_string(path)?.parse()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
    pub fn iter(&self) -> impl '_ + Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.ids.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Pair up the lines of a source and a target list, which must be of
    /// equal length.
    pub fn zip<'a>(&'a self, other: &'a Self) -> Result<impl 'a + Iterator<Item = (&'a str, &'a str)>> {
        if self.len() != other.len() {
            return Err(VcError::ListLengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(self.iter().zip(other.iter()))
    }
}

impl FromStr for UtteranceList {
    type Err = VcError;
    fn from_str(s: &str) -> Result<Self> {
        let ids = s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self::new(ids))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::error::VcError;

    use super::UtteranceList;

    #[test]
    fn parse() {
        let list: UtteranceList = "SF1/100001\r\nSF1/100002\n\n  SF1/100003 \n".parse().unwrap();
        assert_eq!(list.ids(), ["SF1/100001", "SF1/100002", "SF1/100003"]);
        assert!("".parse::<UtteranceList>().unwrap().is_empty());
    }

    #[test]
    fn zip_requires_equal_length() {
        let source: UtteranceList = "a\nb\n".parse().unwrap();
        let target: UtteranceList = "x\ny\n".parse().unwrap();
        let pairs: Vec<_> = source.zip(&target).unwrap().collect();
        assert_eq!(pairs, vec![("a", "x"), ("b", "y")]);

        let short: UtteranceList = "x\n".parse().unwrap();
        assert!(matches!(
            source.zip(&short),
            Err(VcError::ListLengthMismatch { left: 2, right: 1 })
        ));
    }

    #[test]
    fn read_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TF1/100001").unwrap();
        writeln!(file, "TF1/100002").unwrap();
        let list = UtteranceList::read(file.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(UtteranceList::read(file.path().with_extension("missing")).is_err());
    }
}
