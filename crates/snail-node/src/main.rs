#![forbid(unsafe_code)]

use std::path::PathBuf;

use snail_node::{init_tracing, run, NodeConfig};
use tracing::error;

fn main() {
    init_tracing();

    let data_dir = std::env::var_os("SNAIL_DATA_DIR").map(PathBuf::from);
    let result = NodeConfig::from_args(std::env::args().skip(1), data_dir).and_then(|cfg| run(&cfg));
    match result {
        Ok(report) => {
            println!(
                "snail-node: height={} mined={}",
                report.tip.height.0, report.mined
            );
        }
        Err(e) => {
            error!(error = %e, "snail-node failed");
            eprintln!("snail-node error: {e}");
            std::process::exit(1);
        }
    }
}
