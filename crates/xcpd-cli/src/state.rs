use crate::pgstore::{PgDocumentStore, PgPatientStore};
use std::sync::Arc;
use xcpd_core::model::{ResponderEndpoint, UserQualifications};
use xcpd_directory::PgDirectoryStore;
use xcpd_saml::SigningIdentity;
use xcpd_transport::SoapClient;

/// Everything a request handler needs, built once at startup and
/// shared behind an `Arc` — mirrors `ironposh-client-tokio`'s
/// single-shared-client pattern, generalized from one connection to
/// the whole set of outbound/inbound collaborators.
pub struct AppState {
    pub transport: SoapClient,
    pub identity: SigningIdentity,
    pub qualifications: UserQualifications,
    pub directory: PgDirectoryStore,
    pub patients: PgPatientStore,
    pub documents: PgDocumentStore,
    pub national_endpoints: Vec<ResponderEndpoint>,
    pub radius_ladder: Vec<u32>,
    pub max_responders: usize,
    pub own_org_hcid: String,
    pub own_url: String,
    pub known_urls: Vec<String>,
}

pub type SharedState = Arc<AppState>;
