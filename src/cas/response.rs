//! CAS 2.0 response documents and the CAS 1.0 plain-text format.

use quick_xml::escape::escape;

pub const CAS_NAMESPACE: &str = "http://www.yale.edu/tp/cas";

pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Error codes carried in the `code` attribute of failure elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    InvalidRequest,
    InvalidTicket,
    BadPgt,
    InternalError,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::InvalidRequest => "INVALID_REQUEST",
            FailureCode::InvalidTicket => "INVALID_TICKET",
            FailureCode::BadPgt => "BAD_PGT",
            FailureCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// One `cas:serviceResponse` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResponse<'a> {
    AuthenticationSuccess {
        user: &'a str,
    },
    /// `proxyValidate` success. Empty ticket and proxy list are omitted.
    ProxyAuthenticationSuccess {
        user: &'a str,
        proxy_granting_ticket: &'a str,
        proxies: &'a [String],
    },
    AuthenticationFailure {
        code: FailureCode,
        description: &'a str,
    },
    ProxySuccess {
        proxy_ticket: &'a str,
    },
    ProxyFailure {
        code: FailureCode,
        description: &'a str,
    },
}

impl CasResponse<'_> {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CasResponse::AuthenticationSuccess { .. }
                | CasResponse::ProxyAuthenticationSuccess { .. }
                | CasResponse::ProxySuccess { .. }
        )
    }

    /// Render with four-space indentation.
    pub fn to_xml(&self) -> String {
        let body = match self {
            CasResponse::AuthenticationSuccess { user } => format!(
                "    <cas:authenticationSuccess>\n        <cas:user>{}</cas:user>\n    </cas:authenticationSuccess>\n",
                escape(*user)
            ),
            CasResponse::ProxyAuthenticationSuccess {
                user,
                proxy_granting_ticket,
                proxies,
            } => {
                let mut out = String::from("    <cas:authenticationSuccess>\n");
                out.push_str(&format!("        <cas:user>{}</cas:user>\n", escape(*user)));
                if !proxy_granting_ticket.is_empty() {
                    out.push_str(&format!(
                        "        <cas:proxyGrantingTicket>{}</cas:proxyGrantingTicket>\n",
                        escape(*proxy_granting_ticket)
                    ));
                }
                if !proxies.is_empty() {
                    out.push_str("        <cas:proxies>\n");
                    for proxy in proxies.iter() {
                        out.push_str(&format!(
                            "            <cas:proxy>{}</cas:proxy>\n",
                            escape(proxy.as_str())
                        ));
                    }
                    out.push_str("        </cas:proxies>\n");
                }
                out.push_str("    </cas:authenticationSuccess>\n");
                out
            }
            CasResponse::AuthenticationFailure { code, description } => {
                failure_element("authenticationFailure", *code, description)
            }
            CasResponse::ProxySuccess { proxy_ticket } => format!(
                "    <cas:proxySuccess>\n        <cas:proxyTicket>{}</cas:proxyTicket>\n    </cas:proxySuccess>\n",
                escape(*proxy_ticket)
            ),
            CasResponse::ProxyFailure { code, description } => {
                failure_element("proxyFailure", *code, description)
            }
        };

        format!(
            "<cas:serviceResponse xmlns:cas=\"{}\">\n{}</cas:serviceResponse>",
            CAS_NAMESPACE, body
        )
    }
}

fn failure_element(name: &str, code: FailureCode, description: &str) -> String {
    format!(
        "    <cas:{name} code=\"{}\">{}</cas:{name}>\n",
        code.as_str(),
        escape(description)
    )
}

/// CAS 1.0 `/validate` body: `yes\n<user>\n` on success, `no\n` otherwise.
pub fn plain_validate(user: Option<&str>) -> String {
    match user {
        Some(user) => format!("yes\n{}\n", user),
        None => "no\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_success() {
        let xml = CasResponse::AuthenticationSuccess { user: "alice" }.to_xml();
        assert_eq!(
            xml,
            "<cas:serviceResponse xmlns:cas=\"http://www.yale.edu/tp/cas\">\n\
             \x20   <cas:authenticationSuccess>\n\
             \x20       <cas:user>alice</cas:user>\n\
             \x20   </cas:authenticationSuccess>\n\
             </cas:serviceResponse>"
        );
    }

    #[test]
    fn test_authentication_failure() {
        let xml = CasResponse::AuthenticationFailure {
            code: FailureCode::InvalidTicket,
            description: "Invalid Service Ticket",
        }
        .to_xml();
        assert!(xml.contains(
            "<cas:authenticationFailure code=\"INVALID_TICKET\">Invalid Service Ticket</cas:authenticationFailure>"
        ));
    }

    #[test]
    fn test_proxy_documents() {
        let ok = CasResponse::ProxySuccess {
            proxy_ticket: "PT-123",
        };
        assert!(ok.is_success());
        assert!(ok
            .to_xml()
            .contains("<cas:proxySuccess>\n        <cas:proxyTicket>PT-123</cas:proxyTicket>"));

        let bad = CasResponse::ProxyFailure {
            code: FailureCode::BadPgt,
            description: "The pgt provided was invalid",
        };
        assert!(!bad.is_success());
        assert!(bad.to_xml().contains("<cas:proxyFailure code=\"BAD_PGT\">"));
    }

    #[test]
    fn test_proxy_authentication_success() {
        let proxies = vec![
            "https://proxy1.example.com/".to_string(),
            "https://proxy2.example.com/".to_string(),
        ];
        let xml = CasResponse::ProxyAuthenticationSuccess {
            user: "alice",
            proxy_granting_ticket: "PGTIOU-1",
            proxies: &proxies,
        }
        .to_xml();
        assert!(xml.contains("<cas:proxyGrantingTicket>PGTIOU-1</cas:proxyGrantingTicket>"));
        assert!(xml.contains("<cas:proxy>https://proxy2.example.com/</cas:proxy>"));

        let bare = CasResponse::ProxyAuthenticationSuccess {
            user: "alice",
            proxy_granting_ticket: "",
            proxies: &[],
        }
        .to_xml();
        assert!(!bare.contains("proxyGrantingTicket"));
        assert!(!bare.contains("cas:proxies"));
    }

    #[test]
    fn test_user_is_escaped() {
        let xml = CasResponse::AuthenticationSuccess {
            user: "<script>&",
        }
        .to_xml();
        assert!(xml.contains("<cas:user>&lt;script&gt;&amp;</cas:user>"));
    }

    #[test]
    fn test_plain_validate_format() {
        assert_eq!(plain_validate(Some("alice")), "yes\nalice\n");
        assert_eq!(plain_validate(None), "no\n");
    }
}
