//! `app.bsky.feed.post` record types

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use super::excerpt::Excerpt;
use super::POST_COLLECTION;
use crate::types::Post;

const EXTERNAL_EMBED: &str = "app.bsky.embed.external";

/// Body of a `com.atproto.repo.createRecord` call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRecordRequest {
    pub collection: String,
    pub repo: String,
    pub did: String,
    pub record: OutboundRecord,
}

impl CreateRecordRequest {
    pub fn new(actor_id: &str, record: OutboundRecord) -> Self {
        Self {
            collection: POST_COLLECTION.to_string(),
            repo: actor_id.to_string(),
            did: actor_id.to_string(),
            record,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<ExternalEmbed>,
}

impl OutboundRecord {
    /// Record for `post` carrying `excerpt` and a link facet over the short link
    ///
    /// `createdAt` is the post's publication time, not the time of the call.
    pub fn from_excerpt(post: &Post, excerpt: &Excerpt, link_card: bool) -> Self {
        let link = excerpt.link().to_string();

        let embed = link_card.then(|| ExternalEmbed {
            embed_type: EXTERNAL_EMBED.to_string(),
            external: External {
                uri: link.clone(),
                title: post.title.clone(),
                description: excerpt.summary.clone(),
            },
        });

        Self {
            record_type: POST_COLLECTION.to_string(),
            text: excerpt.text.clone(),
            created_at: post
                .published_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            facets: vec![Facet::link(
                excerpt.link_range.start,
                excerpt.link_range.end,
                link,
            )],
            embed,
        }
    }
}

/// Rich-text annotation over a byte range of the record text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    pub fn link(byte_start: usize, byte_end: usize, uri: String) -> Self {
        Self {
            index: ByteSlice {
                byte_start,
                byte_end,
            },
            features: vec![FacetFeature::Link { uri }],
        }
    }
}

/// Half-open `[byteStart, byteEnd)` range in UTF-8 bytes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
}

/// Link card shown under the post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalEmbed {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub external: External,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct External {
    pub uri: String,
    pub title: String,
    pub description: String,
}
