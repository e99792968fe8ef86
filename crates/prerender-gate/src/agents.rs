//! Static lookup tables: crawler user-agent signatures and static-asset
//! extensions that never receive a rendered snapshot.

/// User-agent substrings identifying crawlers and link-preview bots.
///
/// Stored lowercase and matched as plain substrings of the lowercased
/// `user-agent` header.
pub const CRAWLER_USER_AGENTS: &[&str] = &[
    "googlebot",
    "google-inspectiontool",
    "yahoo! slurp",
    "bingbot",
    "yandex",
    "baiduspider",
    "facebookexternalhit",
    "twitterbot",
    "rogerbot",
    "linkedinbot",
    "embedly",
    "quora link preview",
    "showyoubot",
    "outbrain",
    "pinterest/0.",
    "developers.google.com/+/web/snippet",
    "slackbot",
    "vkshare",
    "w3c_validator",
    "redditbot",
    "applebot",
    "whatsapp",
    "flipboard",
    "tumblr",
    "bitlybot",
    "skypeuripreview",
    "nuzzel",
    "discordbot",
    "google page speed",
    "qwantify",
    "pinterestbot",
    "bitrix link preview",
    "xing-contenttabreceiver",
    "chrome-lighthouse",
    "telegrambot",
    "seznambot",
    "screaming frog seo spider",
    "ahrefsbot",
    "ahrefssiteaudit",
    "iframely",
];

/// Path suffixes of static resources. Compared against the lowercased path.
pub const EXTENSIONS_TO_IGNORE: &[&str] = &[
    ".js",
    ".css",
    ".xml",
    ".less",
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".pdf",
    ".doc",
    ".txt",
    ".ico",
    ".rss",
    ".zip",
    ".mp3",
    ".rar",
    ".exe",
    ".wmv",
    ".avi",
    ".ppt",
    ".mpg",
    ".mpeg",
    ".tif",
    ".wav",
    ".mov",
    ".psd",
    ".ai",
    ".xls",
    ".mp4",
    ".m4a",
    ".swf",
    ".dat",
    ".dmg",
    ".iso",
    ".flv",
    ".m4v",
    ".torrent",
    ".woff",
    ".woff2",
    ".ttf",
    ".svg",
    ".webmanifest",
    ".webp",
];

/// Returns true if the user agent contains any crawler signature.
pub fn is_crawler(user_agent: &str) -> bool {
    let user_agent = user_agent.to_lowercase();
    CRAWLER_USER_AGENTS
        .iter()
        .any(|signature| user_agent.contains(signature))
}

/// Returns true if the path names a static resource.
pub fn is_static_asset(path: &str) -> bool {
    let path = path.to_lowercase();
    EXTENSIONS_TO_IGNORE.iter().any(|ext| path.ends_with(ext))
}
