use std::fs;
use std::path::PathBuf;
use tonemark_core::plan::min_sample_rate;
use tonemark_core::*;

fn version_table() -> String {
    let mut table = String::from("export const VERSION_SPECS = {\n");
    for band in Band::ALL {
        table.push_str(&format!("  {}: [\n", band.name()));
        for spec in band.specs() {
            table.push_str(&format!(
                "    {{ version: {}, matrixSize: {}, chunksPerColumn: {}, startMarkerHz: {}, endMarkerHz: {}, gridBaseHz: {}, chunkMs: {}, markerMs: {}, gapMs: {} }},\n",
                spec.version,
                spec.matrix_size,
                spec.chunks_per_column,
                spec.start_marker_hz,
                spec.end_marker_hz,
                spec.data_grid_base_hz,
                spec.chunk_duration_ms,
                spec.marker_duration_ms,
                spec.gap_duration_ms
            ));
        }
        table.push_str("  ],\n");
    }
    table.push_str("} as const\n");
    table
}

fn main() -> std::io::Result<()> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let web_constants_path = root
        .parent()
        .unwrap_or(&root)
        .join("web/src/constants/tonemark.ts");

    let content = format!(
        r#"// AUTO-GENERATED FILE - DO NOT EDIT MANUALLY
// Generated from tonemark-core constants and frequency plan
// Run `cargo run --manifest-path tools/Cargo.toml` to regenerate

export const CHUNK_BITS = {}
export const DATA_GRID_BINS = {}
export const DATA_GRID_STEP_HZ = {}
export const DEFAULT_SAMPLE_RATE = {}
export const DEFAULT_CYCLES = {}
export const CORRUPTION_CEILING = {}
export const LIVE_POLL_INTERVAL_MS = {}
export const MIN_SAMPLE_RATE = {{ mobile: {}, ultrasonic: {} }} as const

{}"#,
        CHUNK_BITS,
        DATA_GRID_BINS,
        DATA_GRID_STEP_HZ,
        DEFAULT_SAMPLE_RATE,
        DEFAULT_CYCLES,
        CORRUPTION_CEILING,
        LIVE_POLL_INTERVAL_MS,
        min_sample_rate(Band::Mobile),
        min_sample_rate(Band::Ultrasonic),
        version_table()
    );

    if let Some(dir) = web_constants_path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&web_constants_path, content)?;

    println!("Generated: {}", web_constants_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_table_lists_every_version() {
        let table = version_table();
        assert!(table.starts_with("export const VERSION_SPECS = {\n"));
        assert!(table.contains("  mobile: [\n"));
        assert!(table.contains("  ultrasonic: [\n"));
        assert_eq!(table.matches("{ version: ").count(), 10);
        assert!(table.contains("startMarkerHz: 16200,"));
    }
}
