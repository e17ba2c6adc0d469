//! Global constants for the MELA client

/// Image file extensions recognised when a file carries no declared media type.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "tif", "heic",
];

/// Media type prefix accepted by the validator.
pub const IMAGE_MEDIA_PREFIX: &str = "image/";

/// Environment variable overriding the configured endpoint address.
pub const ENDPOINT_ENV_VAR: &str = "MELA_ENDPOINT_URL";

/// Default environment variable holding the service access credential.
pub const DEFAULT_CREDENTIAL_ENV_VAR: &str = "MELA_API_KEY";

/// Default transport header carrying the access credential.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "x-api-key";

/// Default bound on one analysis request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Prefix of generated analysis ids.
pub const ANALYSIS_ID_PREFIX: &str = "analysis_";
