/// IMAP endpoint for an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImapEndpoint {
    pub host: String,
    pub port: u16,
}

pub const IMAPS_PORT: u16 = 993;

impl ImapEndpoint {
    /// Pick the server from an explicit override, else from the address domain.
    pub fn resolve(address: &str, host: Option<&str>, port: Option<u16>) -> Option<Self> {
        let port = port.unwrap_or(IMAPS_PORT);
        if let Some(host) = host {
            return Some(Self {
                host: host.to_string(),
                port,
            });
        }

        let domain = address.rsplit_once('@')?.1.trim().to_lowercase();
        if domain.is_empty() {
            return None;
        }

        let host = match domain.as_str() {
            "gmail.com" | "googlemail.com" => "imap.gmail.com".to_string(),
            "outlook.com" | "hotmail.com" | "live.com" | "msn.com" => {
                "outlook.office365.com".to_string()
            }
            "icloud.com" | "me.com" | "mac.com" => "imap.mail.me.com".to_string(),
            d if d == "yahoo.com" || d.starts_with("yahoo.") || d == "ymail.com" => {
                "imap.mail.yahoo.com".to_string()
            }
            d => format!("imap.{d}"),
        };

        Some(Self { host, port })
    }
}
