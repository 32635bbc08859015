pub mod validation;

pub use validation::{is_valid_dns_list, is_valid_ipv4, is_valid_ipv4_cidr, is_valid_ssh_public_key, is_valid_url};
