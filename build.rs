use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Create config template if it doesn't exist
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../tsmux.template.toml");

    let template = r#"# tsmux configuration
# Copy this file to 'tsmux.toml' and adjust the values

# Target output bitrate in bits per second (0 = unconstrained)
rate = 0
# Pad the output with null packets to hold the rate
fixed_rate = false
# Live session: never reports end of stream
real_time = false
transport_stream_id = 1
pat_refresh_ms = 100
initial_pcr = 0
one_au_per_pes = false
queue_capacity = 64

[[programs]]
number = 1
pmt_pid = 4096
pmt_refresh_ms = 100
pcr_offset = 0
pcr_interval_ms = 40
pcr_tolerance_ms = 10

[[programs.streams]]
pid = 256
codec = "h264"
is_pcr = true

[[programs.streams]]
pid = 257
codec = "aac"
language = "eng"
"#;

    if !template_path.exists() {
        let _ = fs::write(template_path, template);
    }
    println!("cargo:rerun-if-changed=build.rs");
}
