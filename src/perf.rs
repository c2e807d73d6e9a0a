//! Part loading, optionally in parallel.
//!
//! With the `parallel` feature, candidate part files are read concurrently
//! on the Rayon pool.  Output order always matches input order, and any
//! single read failure fails the whole load; nothing downstream sees a
//! partial set.  Without the feature the same contract holds sequentially.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::io_stream::{PartSource, RawPart};

fn load_one<S: PartSource + ?Sized>(source: &S, path: PathBuf) -> Result<RawPart> {
    let bytes = source.load(&path).map_err(Error::io_at(&path))?;
    Ok(RawPart { path, bytes })
}

/// Load every path through `source`, preserving order.
pub fn load_all<S: PartSource + ?Sized>(source: &S, paths: Vec<PathBuf>) -> Result<Vec<RawPart>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        paths
            .into_par_iter()
            .map(|path| load_one(source, path))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        paths.into_iter().map(|path| load_one(source, path)).collect()
    }
}
