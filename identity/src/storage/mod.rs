mod paths;
mod vault;

pub use paths::IdentityPaths;
pub use vault::{
    KdfParameters, VaultCreateParams, VaultManager, VaultMetadata, VaultSecrets, VaultUnlocked,
};
