//! Response schema of the FxTwitter status API.
//!
//! Required fields are plain types so that deserialization doubles as schema
//! validation: a payload missing any of them is rejected as a whole.

use serde::Deserialize;

use crate::metadata::{TweetMedia, TweetMetadata};

#[derive(Debug, Clone, Deserialize)]
pub struct FxTwitterResponse {
    pub code: i64,
    pub message: String,
    pub tweet: FxTweet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxTweet {
    pub url: String,
    pub text: String,
    pub created_at: String,
    pub created_timestamp: i64,
    pub author: FxAuthor,
    pub replies: u64,
    pub retweets: u64,
    pub likes: u64,
    pub views: u64,
    pub color: Option<String>,
    pub twitter_card: Option<String>,
    pub lang: String,
    pub source: String,
    #[serde(default)]
    pub replying_to: serde_json::Value,
    #[serde(default)]
    pub replying_to_status: serde_json::Value,
    pub quote: Option<FxQuote>,
    pub media: Option<FxMedia>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxAuthor {
    pub name: String,
    pub screen_name: String,
    pub avatar_url: String,
    pub avatar_color: Option<String>,
    pub banner_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxQuote {
    pub text: String,
    pub author: FxQuoteAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxQuoteAuthor {
    pub name: String,
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FxMedia {
    pub all: Option<Vec<FxMediaItem>>,
    pub external: Option<FxExternalVideo>,
    pub photos: Option<Vec<FxPhoto>>,
    pub videos: Option<Vec<FxVideo>>,
    pub mosaic: Option<FxMosaic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FxMediaKind {
    Video,
    Gif,
    Photo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxMediaItem {
    #[serde(rename = "type")]
    pub kind: FxMediaKind,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub duration: Option<f64>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxExternalVideo {
    pub url: String,
    pub height: u32,
    pub width: u32,
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxPhoto {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxVideo {
    #[serde(rename = "type")]
    pub kind: FxMediaKind,
    pub url: String,
    pub thumbnail_url: String,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxMosaic {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub formats: FxMosaicFormats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxMosaicFormats {
    pub webp: String,
    pub jpeg: String,
}

impl From<FxTwitterResponse> for TweetMetadata {
    fn from(response: FxTwitterResponse) -> Self {
        let tweet = response.tweet;
        let media = tweet.media.and_then(|media| {
            let video = media.videos.and_then(|videos| videos.into_iter().next());
            match video {
                Some(video) => Some(TweetMedia::Video { url: video.url }),
                None => media
                    .photos
                    .filter(|photos| !photos.is_empty())
                    .map(|photos| TweetMedia::Photos(photos.into_iter().map(|p| p.url).collect())),
            }
        });

        TweetMetadata {
            url: tweet.url,
            author_name: tweet.author.name,
            screen_name: tweet.author.screen_name,
            text: tweet.text,
            media,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(media: serde_json::Value) -> serde_json::Value {
        json!({
            "code": 200,
            "message": "OK",
            "tweet": {
                "url": "https://x.com/alice/status/12345",
                "text": "hello <b>world</b>",
                "created_at": "Wed Oct 05 20:17:27 +0000 2022",
                "created_timestamp": 1665001047,
                "author": {
                    "name": "Alice",
                    "screen_name": "alice",
                    "avatar_url": "https://pbs.twimg.com/a.jpg",
                    "avatar_color": null,
                    "banner_url": "https://pbs.twimg.com/b.jpg"
                },
                "replies": 1,
                "retweets": 2,
                "likes": 3,
                "views": 4,
                "color": null,
                "lang": "en",
                "source": "Twitter Web App",
                "replying_to": null,
                "replying_to_status": null,
                "media": media
            }
        })
    }

    #[test]
    fn video_wins_over_photos() {
        let value = payload(json!({
            "photos": [{ "type": "photo", "url": "https://pbs.twimg.com/p.jpg", "width": 1, "height": 1 }],
            "videos": [{
                "type": "video",
                "url": "https://video.twimg.com/v.mp4",
                "thumbnail_url": "https://pbs.twimg.com/t.jpg",
                "width": 1280,
                "height": 720,
                "duration": 12.5,
                "format": "video/mp4"
            }]
        }));
        let response: FxTwitterResponse = serde_json::from_value(value).unwrap();
        let metadata = TweetMetadata::from(response);
        assert_eq!(
            metadata.media,
            Some(TweetMedia::Video {
                url: "https://video.twimg.com/v.mp4".to_string()
            })
        );
    }

    #[test]
    fn photos_keep_their_order() {
        let value = payload(json!({
            "photos": [
                { "type": "photo", "url": "https://pbs.twimg.com/1.jpg", "width": 1, "height": 1 },
                { "type": "photo", "url": "https://pbs.twimg.com/2.jpg", "width": 1, "height": 1 }
            ],
            "videos": []
        }));
        let response: FxTwitterResponse = serde_json::from_value(value).unwrap();
        assert_eq!(
            TweetMetadata::from(response).media,
            Some(TweetMedia::Photos(vec![
                "https://pbs.twimg.com/1.jpg".to_string(),
                "https://pbs.twimg.com/2.jpg".to_string(),
            ]))
        );
    }

    #[test]
    fn missing_media_renders_nothing() {
        let response: FxTwitterResponse =
            serde_json::from_value(payload(serde_json::Value::Null)).unwrap();
        let metadata = TweetMetadata::from(response);
        assert_eq!(metadata.media, None);
        assert_eq!(metadata.screen_name, "alice");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut value = payload(serde_json::Value::Null);
        value["tweet"]["author"]
            .as_object_mut()
            .unwrap()
            .remove("screen_name");
        assert!(serde_json::from_value::<FxTwitterResponse>(value).is_err());
    }
}
