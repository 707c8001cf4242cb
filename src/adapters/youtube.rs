use std::{
    path::Path,
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::csv_file::ROW_KEY;
use crate::{
    document::{Document, Metadata, MetadataValue, SOURCE_KEY},
    error::{Error, Result},
};

pub const DEFAULT_LANGUAGE: &str = "ja";

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=";
const OEMBED_URL: &str = "https://www.youtube.com/oembed";

static VIDEO_ID_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"(?:v=|/)([0-9A-Za-z_-]{11}).*",
        r"(?:embed/)([0-9A-Za-z_-]{11})",
        r"(?:shorts/)([0-9A-Za-z_-]{11})",
        r"^([0-9A-Za-z_-]{11})$",
    ]
    .map(|p| Regex::new(p).expect("unreachable error: invalid video id regex"))
});

static PLAYLIST_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:list=)([0-9A-Za-z_-]+)")
        .expect("unreachable error: invalid playlist id regex")
});

static PLAYLIST_VIDEO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""videoId":"([0-9A-Za-z_-]{11})""#)
        .expect("unreachable error: invalid playlist video regex")
});

static TIMED_TEXT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<text[^>]*>(.*?)</text>")
        .expect("unreachable error: invalid timed text regex")
});

/// The video id in a watch, short-link, embed or shorts URL.
///
/// Returns the input unchanged when no id can be found.
pub fn extract_video_id(url: &str) -> String {
    for pattern in VIDEO_ID_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(url) {
            return caps[1].to_string();
        }
    }
    warn!(url, "could not extract video id");
    url.to_string()
}

/// The playlist id in a `list=` URL, or the input unchanged.
pub fn extract_playlist_id(url: &str) -> String {
    match PLAYLIST_ID_PATTERN.captures(url) {
        Some(caps) => caps[1].to_string(),
        None => {
            warn!(url, "could not extract playlist id");
            url.to_string()
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_URL}{video_id}")
}

/// Descriptive video fields; absent when the lookup fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Where transcripts and video details come from.
pub trait TranscriptSource: Send + Sync {
    /// The transcript text in `language`, or `None` when the video has no
    /// captions in that language.
    fn transcript(&self, video_id: &str, language: &str)
    -> Result<Option<String>>;

    fn video_info(&self, video_id: &str) -> Result<VideoInfo>;

    /// Video ids listed on a playlist, in playlist order.
    fn playlist_video_ids(&self, playlist_id: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
}

/// Fetches captions by scraping the public watch page.
///
/// The watch page embeds a `captionTracks` list; the track in the
/// requested language points at a timed-text XML document whose `<text>`
/// elements hold the transcript lines.
pub struct HttpTranscriptSource {
    client: reqwest::blocking::Client,
}

impl HttpTranscriptSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("vecdb/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

/// The `captionTracks` array embedded in a watch page.
fn parse_caption_tracks(page: &str) -> Result<Vec<CaptionTrack>> {
    const MARKER: &str = "\"captionTracks\":";
    let Some(start) = page.find(MARKER) else {
        return Ok(Vec::new());
    };
    let rest = &page[start + MARKER.len()..];
    match serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<CaptionTrack>>()
        .next()
    {
        Some(tracks) => Ok(tracks?),
        None => Ok(Vec::new()),
    }
}

/// Transcript lines from a timed-text XML document, one per line.
fn parse_timed_text(xml: &str) -> String {
    TIMED_TEXT_PATTERN
        .captures_iter(xml)
        .map(|caps| unescape_html(caps[1].trim()))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else { break };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#')?.parse().ok())
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl TranscriptSource for HttpTranscriptSource {
    fn transcript(
        &self,
        video_id: &str,
        language: &str,
    ) -> Result<Option<String>> {
        let page = self.get_text(&watch_url(video_id))?;
        let tracks = parse_caption_tracks(&page)?;
        let Some(track) = tracks.iter().find(|t| t.language_code == language)
        else {
            debug!(video_id, language, tracks = tracks.len(), "no caption track");
            return Ok(None);
        };

        let xml = self.get_text(&track.base_url)?;
        let text = parse_timed_text(&xml);
        Ok((!text.is_empty()).then_some(text))
    }

    fn video_info(&self, video_id: &str) -> Result<VideoInfo> {
        let oembed: OEmbed = self
            .client
            .get(OEMBED_URL)
            .query(&[("url", watch_url(video_id).as_str()), ("format", "json")])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(VideoInfo {
            title: oembed.title,
            author: oembed.author_name,
        })
    }

    fn playlist_video_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let page = self.get_text(&format!("{PLAYLIST_URL}{playlist_id}"))?;
        let mut ids: Vec<String> = Vec::new();
        for caps in PLAYLIST_VIDEO_PATTERN.captures_iter(&page) {
            let id = &caps[1];
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

impl std::fmt::Debug for HttpTranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTranscriptSource").finish_non_exhaustive()
    }
}

/// One document per video transcript.
#[derive(Clone)]
pub struct YouTubeAdapter {
    language: String,
    source: Arc<dyn TranscriptSource>,
}

impl YouTubeAdapter {
    /// Japanese transcripts fetched over HTTP.
    pub fn new() -> Result<Self> {
        Ok(Self::with_source(Arc::new(HttpTranscriptSource::new()?)))
    }

    pub fn with_source(source: Arc<dyn TranscriptSource>) -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            source,
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// The transcript of `video_id` as a single document.
    ///
    /// Metadata holds `video_id`, `url`, `source` and, when the lookup
    /// succeeds, `title` and `author`; entries in `extra` override these.
    /// A missing transcript or failed fetch yields nothing.
    pub fn documents_for_video(
        &self,
        video_id: &str,
        extra: &Metadata,
    ) -> Vec<Document> {
        let transcript = match self.source.transcript(video_id, &self.language)
        {
            Ok(Some(transcript)) => transcript,
            Ok(None) => {
                warn!(video_id, language = %self.language, "no transcript found");
                return Vec::new();
            }
            Err(e) => {
                warn!(video_id, error = %e, "failed to fetch transcript");
                return Vec::new();
            }
        };

        let url = watch_url(video_id);
        let mut metadata = Metadata::new();
        metadata.insert("video_id".to_string(), video_id.into());
        metadata.insert(SOURCE_KEY.to_string(), url.as_str().into());
        metadata.insert("url".to_string(), url.into());

        match self.source.video_info(video_id) {
            Ok(info) => {
                if let Some(title) = info.title {
                    metadata.insert("title".to_string(), title.into());
                }
                if let Some(author) = info.author {
                    metadata.insert("author".to_string(), author.into());
                }
            }
            Err(e) => warn!(video_id, error = %e, "failed to fetch video details"),
        }
        metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        info!(
            video_id,
            title = metadata.get("title").and_then(MetadataValue::as_str),
            "fetched transcript"
        );
        vec![Document {
            content: transcript,
            metadata,
        }]
    }

    pub fn documents_from_url(&self, url: &str) -> Vec<Document> {
        self.documents_for_video(&extract_video_id(url), &Metadata::new())
    }

    pub fn documents_from_urls<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Document> {
        urls.iter()
            .flat_map(|url| self.documents_from_url(url.as_ref()))
            .collect()
    }
}

impl std::fmt::Debug for YouTubeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeAdapter")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Transcripts of every video on a playlist.
#[derive(Debug, Clone)]
pub struct YouTubePlaylistAdapter {
    videos: YouTubeAdapter,
}

impl YouTubePlaylistAdapter {
    pub fn new(videos: YouTubeAdapter) -> Self {
        Self { videos }
    }

    pub fn documents_from_playlist(&self, playlist_url: &str) -> Vec<Document> {
        let playlist_id = extract_playlist_id(playlist_url);
        let video_ids = match self.videos.source.playlist_video_ids(&playlist_id)
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(playlist_id = %playlist_id, error = %e, "failed to fetch playlist");
                return Vec::new();
            }
        };
        if video_ids.is_empty() {
            warn!(playlist_id = %playlist_id, "playlist has no videos");
            return Vec::new();
        }

        let documents: Vec<Document> = video_ids
            .iter()
            .flat_map(|id| self.videos.documents_for_video(id, &Metadata::new()))
            .collect();
        info!(playlist_id = %playlist_id, documents = documents.len(), "fetched playlist");
        documents
    }
}

/// Transcripts of the videos listed in one column of a CSV file.
#[derive(Debug, Clone)]
pub struct YouTubeCsvAdapter {
    url_column: String,
    metadata_columns: Vec<String>,
    videos: YouTubeAdapter,
}

impl YouTubeCsvAdapter {
    pub fn new(
        url_column: &str,
        metadata_columns: Vec<String>,
        videos: YouTubeAdapter,
    ) -> Self {
        Self {
            url_column: url_column.to_string(),
            metadata_columns,
            videos,
        }
    }

    /// One document per row with a fetchable transcript.
    ///
    /// Each document carries the CSV path as `source`, the zero-based `row`
    /// and the non-empty metadata columns. A missing file or URL column
    /// yields nothing.
    pub fn documents_from_csv(&self, csv_path: &Path) -> Vec<Document> {
        match self.read(csv_path) {
            Ok(documents) => {
                info!(
                    path = %csv_path.display(),
                    documents = documents.len(),
                    "fetched transcripts from CSV"
                );
                documents
            }
            Err(e) => {
                warn!(path = %csv_path.display(), error = %e, "failed to read CSV");
                Vec::new()
            }
        }
    }

    fn read(&self, csv_path: &Path) -> Result<Vec<Document>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(csv_path)?;
        let headers: Vec<String> =
            reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let url_idx = position(&self.url_column).ok_or_else(|| {
            Error::Config(format!("column '{}' not found", self.url_column))
        })?;
        let metadata_idx: Vec<(&str, usize)> = self
            .metadata_columns
            .iter()
            .filter_map(|name| Some((name.as_str(), position(name)?)))
            .collect();

        let mut documents = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(row, error = %e, "skipping malformed CSV row");
                    continue;
                }
            };
            let url = record.get(url_idx).unwrap_or("").trim();
            if url.is_empty() {
                continue;
            }

            let mut extra = Metadata::new();
            for (name, idx) in &metadata_idx {
                let value = record.get(*idx).unwrap_or("").trim();
                if !value.is_empty() {
                    extra.insert(name.to_string(), value.into());
                }
            }
            extra.insert(
                SOURCE_KEY.to_string(),
                csv_path.display().to_string().into(),
            );
            extra.insert(ROW_KEY.to_string(), row.into());

            documents.extend(
                self.videos.documents_for_video(&extract_video_id(url), &extra),
            );
        }
        Ok(documents)
    }
}
