//! Prints the NodePool CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/nodepools.yaml`

use crds::NodePool;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&NodePool::crd())?);
    Ok(())
}
