use serde::{Deserialize, Serialize};

pub const SSH_PORT: u16 = 22;
pub const HTTPS_PORT: u16 = 443;
pub const ANYWHERE_CIDR: &str = "0.0.0.0/0";

/// Outcome of a provider call that may collide with an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned<T> {
    Created(T),
    AlreadyExists,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl IngressRule {
    pub fn tcp_from_anywhere(port: u16) -> Self {
        IngressRule {
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr: ANYWHERE_CIDR.to_string(),
        }
    }
}

/// SSH, HTTPS and the service port, each open to all addresses.
pub fn service_ingress_rules(api_port: u16) -> Vec<IngressRule> {
    vec![
        IngressRule::tcp_from_anywhere(SSH_PORT),
        IngressRule::tcp_from_anywhere(HTTPS_PORT),
        IngressRule::tcp_from_anywhere(api_port),
    ]
}
