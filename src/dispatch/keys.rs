/// Prefix every output object is written under.
pub const OUTPUT_PREFIX: &str = "processed/";

const CSV_SUFFIX: &str = ".csv";

/// True when `key` names a CSV object, ignoring case (`data.CSV` counts).
pub fn is_csv_key(key: &str) -> bool {
    key.to_lowercase().ends_with(CSV_SUFFIX)
}

/// Output key for a source key: the first literal `.csv` is removed and the
/// result is placed under `processed/` with a `_processed.csv` suffix.
///
/// `folder/data.csv` → `processed/folder/data_processed.csv`
pub fn output_key(key: &str) -> String {
    format!(
        "{}{}_processed.csv",
        OUTPUT_PREFIX,
        key.replacen(CSV_SUFFIX, "", 1)
    )
}
