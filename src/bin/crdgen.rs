//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for the Function and trigger
//! resources reconciled by the function controller.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use function_controller::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
