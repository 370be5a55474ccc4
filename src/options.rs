/// Hash algorithm for ExifTool's `ImageDataHash` computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageHashType {
    Md5,
    Sha256,
    Sha512,
}

impl ImageHashType {
    pub(crate) fn api_value(self) -> &'static str {
        match self {
            ImageHashType::Md5 => "MD5",
            ImageHashType::Sha256 => "SHA256",
            ImageHashType::Sha512 => "SHA512",
        }
    }
}

/// Configuration for read and write tasks.
///
/// The defaults match plain `exiftool -json` behavior; the timezone
/// fields opt into the inference cascade described on [`crate::tz`].
#[derive(Debug, Clone)]
pub struct ExifPipeOptions {
    /// Tags to read with ExifTool's `-TAG#` numeric override instead of
    /// the human-readable rendering.
    pub numeric_tags: Vec<String>,

    /// Emit `-struct` so nested XMP structures arrive as JSON objects
    /// instead of flattened strings.
    pub expand_structs: bool,

    /// Emit `-G` so tag keys carry their `Group:` prefix. Decoding keeps
    /// the prefixed keys and builds a degrouped view for cross-tag
    /// lookups.
    pub group_prefixes: bool,

    /// Enable ExifTool's geolocation API (`GeolocationTimeZone` etc.).
    pub geolocation: bool,

    /// Ask the worker to hash the image data stream.
    pub image_hash_type: Option<ImageHashType>,

    /// Assign the cascade's inferred zone to date-times that were decoded
    /// without one.
    pub backfill_timezones: bool,

    /// Treat zoneless timestamps in video files as UTC. Most video
    /// containers store UTC but omit the offset.
    pub default_videos_to_utc: bool,

    /// Try the GPS-derived zone before explicit timezone tags.
    pub prefer_timezone_from_gps: bool,
}

impl Default for ExifPipeOptions {
    fn default() -> Self {
        Self {
            numeric_tags: Vec::new(),
            expand_structs: true,
            group_prefixes: false,
            geolocation: false,
            image_hash_type: None,
            backfill_timezones: true,
            default_videos_to_utc: true,
            prefer_timezone_from_gps: false,
        }
    }
}
