use crate::error::CoreError;
use clap::Parser;

/// CLI configuration for the discovery/exchange service binary.
///
/// Mirrors the distilled spec's external interface (§6): one process
/// exposes the responder endpoints, the orchestrator's
/// `getCarequalityPatient` action, and the directory maintenance
/// actions, all behind one bind address.
#[derive(Debug, Clone, Parser)]
#[command(name = "xcpd", about = "Cross-community patient discovery & document exchange service")]
pub struct Args {
    /// Address the HTTP service binds to.
    #[arg(long, env = "XCPD_BIND_ADDR", default_value = "0.0.0.0:8443")]
    pub bind_addr: String,

    /// Postgres connection string for the directory store.
    #[arg(long, env = "XCPD_DATABASE_URL")]
    pub database_url: String,

    /// Client certificate (PEM) used for mutually-authenticated TLS
    /// and as the SAML signing certificate.
    #[arg(long, env = "XCPD_CLIENT_CERT")]
    pub client_cert_path: std::path::PathBuf,

    /// Private key (PEM, PKCS#8) matching `client_cert_path`.
    #[arg(long, env = "XCPD_CLIENT_KEY")]
    pub client_key_path: std::path::PathBuf,

    /// Trust bundle (PEM) used to validate responder certificates.
    #[arg(long, env = "XCPD_TRUST_BUNDLE")]
    pub trust_bundle_path: std::path::PathBuf,

    /// Path to the JSON list of national-level responders (§4.6 pass 1).
    #[arg(long, env = "XCPD_NATIONAL_ENDPOINTS")]
    pub national_endpoints_path: std::path::PathBuf,

    /// Search radius ladder in miles, widest first, consumed on
    /// re-query when a pass returns more than 80 responders.
    #[arg(long, value_delimiter = ',', default_value = "100,30,10")]
    pub radius_ladder: Vec<u32>,

    /// Maximum responders kept after radius escalation (§4.6 step 4).
    #[arg(long, default_value_t = 200)]
    pub max_responders: usize,

    /// This gateway's own home community id, burned into every outbound
    /// envelope's sender identifiers and used to filter inbound ITI-39
    /// `DocumentRequest`s down to documents we actually hold.
    #[arg(long, env = "XCPD_OWN_ORG_HCID")]
    pub own_org_hcid: String,

    /// This gateway's own externally-reachable URL, used as the
    /// `sender/telecom` value and checked against inbound `To` headers
    /// alongside `known_responder_urls`.
    #[arg(long, env = "XCPD_OWN_URL")]
    pub own_url: String,

    /// Every `To` value this gateway accepts inbound requests as —
    /// normally just `own_url` plus any load-balancer aliases.
    #[arg(long, value_delimiter = ',', default_value = "")]
    pub known_responder_urls: Vec<String>,

    /// Subject distinguished name asserted in the SAML `NameID`,
    /// matching the signing certificate named by `client_cert_path`.
    #[arg(long, env = "XCPD_SUBJECT_NAME")]
    pub subject_name: String,

    /// Requesting organization's display name (XSPA `organization` attribute).
    #[arg(long, env = "XCPD_ORGANIZATION")]
    pub organization: String,

    /// Requesting provider's National Provider Identifier.
    #[arg(long, env = "XCPD_NPI")]
    pub npi: String,

    /// XSPA purpose-of-use code, e.g. `TREAT`.
    #[arg(long, default_value = "TREAT")]
    pub purpose_of_use_code: String,

    #[arg(long, default_value = "2.16.840.1.113883.1.11.20448")]
    pub purpose_of_use_code_system: String,

    #[arg(long, default_value = "HL7POU")]
    pub purpose_of_use_code_system_name: String,

    #[arg(long, default_value = "Treatment")]
    pub purpose_of_use_display_name: String,

    /// XSPA structural role code, e.g. the HL7 Provider role.
    #[arg(long, default_value = "106331006")]
    pub role_code: String,

    #[arg(long, default_value = "2.16.840.1.113883.6.96")]
    pub role_code_system: String,

    #[arg(long, default_value = "SNOMED-CT")]
    pub role_code_system_name: String,

    /// Verbosity; repeat for more detail (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Optional log file; stderr is always written to in addition.
    #[arg(long, env = "XCPD_LOG_FILE")]
    pub log_file: Option<std::path::PathBuf>,
}

impl Args {
    /// Builds this gateway's own attestation values from the CLI
    /// configuration. Infallible here because `clap` already enforces
    /// these fields are present; kept as `Result` so callers go through
    /// the same fallible construction path request-supplied
    /// qualifications would.
    pub fn qualifications(&self) -> Result<crate::model::UserQualifications, CoreError> {
        crate::model::UserQualifications::validate(
            Some(self.subject_name.clone()),
            Some(self.organization.clone()),
            Some(self.npi.clone()),
            Some(self.own_org_hcid.clone()),
            Some(crate::model::PurposeOfUse {
                code: self.purpose_of_use_code.clone(),
                code_system: self.purpose_of_use_code_system.clone(),
                code_system_name: self.purpose_of_use_code_system_name.clone(),
                display_name: self.purpose_of_use_display_name.clone(),
            }),
            Some(crate::model::Role {
                code: self.role_code.clone(),
                code_system: self.role_code_system.clone(),
                code_system_name: self.role_code_system_name.clone(),
            }),
        )
    }
}
