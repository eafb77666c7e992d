//! Hex-file loading for array pre-initialization.

use crate::cast::ValueCastTo;
use std::fs;
use std::path::Path;

/// Loads a line-oriented hex file into the front of `dst`.
///
/// Each non-empty line holds one hexadecimal value (`//` comments and blank
/// lines are skipped). The file may hold fewer values than the array;
/// trailing elements keep their current contents.
///
/// # Panics
///
/// Panics when the file cannot be read, a line is not valid hex, or the
/// file holds more values than the array: all fatal simulator-start
/// conditions.
pub fn load_hex_file<T>(dst: &mut [T], path: impl AsRef<Path>)
where
    u64: ValueCastTo<T>,
{
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read hex file {}: {e}", path.display()));
    let mut idx = 0;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let value = u64::from_str_radix(line, 16).unwrap_or_else(|e| {
            panic!(
                "bad hex value at {}:{}: {e}",
                path.display(),
                lineno + 1
            )
        });
        assert!(
            idx < dst.len(),
            "hex file {} holds more values than the array ({})",
            path.display(),
            dst.len()
        );
        dst[idx] = value.cast();
        idx += 1;
    }
}
