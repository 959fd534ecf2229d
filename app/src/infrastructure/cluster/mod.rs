mod kube;

pub use self::kube::KubeCluster;
