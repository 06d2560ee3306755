//! Prints the YAML manifests for all Beskar7 CRDs to stdout.
//!
//! Run as `cargo run --bin crdgen > config/crd/bases/all.yaml`.

use crds::{Beskar7Cluster, Beskar7Machine, Beskar7MachineTemplate, PhysicalHost};
use kube::CustomResourceExt;

fn main() {
    let crds = vec![
        serde_yaml::to_string(&PhysicalHost::crd()).expect("serialize PhysicalHost crd"),
        serde_yaml::to_string(&Beskar7Machine::crd()).expect("serialize Beskar7Machine crd"),
        serde_yaml::to_string(&Beskar7MachineTemplate::crd())
            .expect("serialize Beskar7MachineTemplate crd"),
        serde_yaml::to_string(&Beskar7Cluster::crd()).expect("serialize Beskar7Cluster crd"),
    ];

    println!("{}", crds.join("---\n"));
}
