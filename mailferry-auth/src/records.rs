//! SPF/DKIM/DMARC TXT records a sending domain must publish.

use std::net::IpAddr;

use serde::Serialize;

/// One DNS record a domain owner publishes, as `(name, type, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: &'static str,
    pub value: String,
}

/// The three authentication records derived for a sending domain.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRecords {
    pub spf: DnsRecord,
    pub dkim: DnsRecord,
    pub dmarc: DnsRecord,
}

pub(crate) fn for_domain(
    domain: &str,
    selector: &str,
    public_key_b64: &str,
    outbound_ip: IpAddr,
) -> AuthRecords {
    let ip_mechanism = match outbound_ip {
        IpAddr::V4(ip) => format!("ip4:{ip}"),
        IpAddr::V6(ip) => format!("ip6:{ip}"),
    };

    AuthRecords {
        spf: DnsRecord {
            name: domain.to_string(),
            record_type: "TXT",
            value: format!("v=spf1 {ip_mechanism} include:_spf.google.com -all"),
        },
        dkim: DnsRecord {
            name: format!("{selector}._domainkey.{domain}"),
            record_type: "TXT",
            value: format!("v=DKIM1; k=rsa; p={public_key_b64}"),
        },
        dmarc: DnsRecord {
            name: format!("_dmarc.{domain}"),
            record_type: "TXT",
            value: format!(
                "v=DMARC1; p=quarantine; rua=mailto:dmarc@{domain}; ruf=mailto:dmarc@{domain}; fo=1"
            ),
        },
    }
}
