//! CRD YAML Generator
//!
//! This binary generates the Kubernetes CRD manifest for the KubegresRestore
//! resource defined by the kubegres-restore-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/kubegresrestore.yaml

use kubegres_restore_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
