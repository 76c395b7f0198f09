//! Directory traversal: globbing and filtered recursive walks

use ferrum_core::Result;

use crate::path::LocalPath;

impl LocalPath {
    /// Paths matching the glob pattern under this path.
    ///
    /// Returns an empty list when nothing matches (including when this path
    /// does not exist).
    pub fn glob(&self, pattern: &str) -> Result<Vec<LocalPath>> {
        let full = self.join([pattern]);
        let mut matches: Vec<LocalPath> = Vec::new();
        let walker = match glob::glob(full.as_str()) {
            Ok(w) => w,
            // a malformed pattern matches nothing, like an empty directory
            Err(e) => {
                log::debug!("glob pattern {:?} rejected: {}", full.as_str(), e);
                return Ok(matches);
            }
        };
        for entry in walker {
            match entry {
                Ok(p) => matches.push(self.like(p.to_string_lossy())),
                Err(e) => return Err(e.into_error().into()),
            }
        }
        matches.sort();
        Ok(matches)
    }

    /// All sub-elements under this directory that pass `filter`, recursing
    /// into directories that pass it. The element itself is yielded before
    /// its children.
    pub fn walk<F>(&self, filter: F) -> Result<Vec<LocalPath>>
    where
        F: Fn(&LocalPath) -> bool,
    {
        let mut found: Vec<LocalPath> = Vec::new();
        self.walk_into(&filter, &mut found)?;
        Ok(found)
    }

    fn walk_into<F>(&self, filter: &F, found: &mut Vec<LocalPath>) -> Result<()>
    where
        F: Fn(&LocalPath) -> bool,
    {
        for entry in self.list()? {
            if filter(&entry) {
                let is_dir = entry.is_dir();
                found.push(entry.clone());
                if is_dir {
                    entry.walk_into(filter, found)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_on_missing_directory_matches_nothing() {
        let t = LocalPath::new("/foo/bar");
        assert_eq!(t.glob("*").unwrap(), Vec::<LocalPath>::new());
    }
}
