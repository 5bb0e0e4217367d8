//! Video-room camera links.
//!
//! Each camera slot gets a push ("join") link for the person on camera and
//! a solo view link for OBS. Screenshare slots also get a `:s` view link.

use crate::config::RoomConfig;
use crate::types::{NameTag, Slot};

/// Links and label for one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraLinks {
    pub label: String,
    pub human_link: String,
    pub obs_link: String,
    pub obs_screenshare_link: Option<String>,
}

/// Stream id for a camera index: 0 → `CAM_A`, 1 → `CAM_B`, ...
pub fn stream_id(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    format!("CAM_{letter}")
}

/// Links for camera `index`, or `None` past the configured labels.
pub fn camera_links(room: &RoomConfig, index: usize) -> Option<CameraLinks> {
    let label = room.labels.get(index)?;
    let base = room.base_url.trim_end_matches('/');
    let stream = stream_id(index);
    let room_name = urlencoding::encode(&room.name);
    let label_enc = urlencoding::encode(label);

    let screenshare = room
        .screenshare_slots
        .iter()
        .any(|&s| usize::from(s) == index)
        .then(|| format!("{base}/?view={stream}:s&solo&room={room_name}"));

    Some(CameraLinks {
        label: label.clone(),
        human_link: format!("{base}/?room={room_name}&push={stream}&label={label_enc}"),
        obs_link: format!("{base}/?view={stream}&solo&room={room_name}"),
        obs_screenshare_link: screenshare,
    })
}

/// Panel entry for a new camera: blank name, label as subtext, room links.
pub fn default_nametag(room: &RoomConfig, index: usize) -> NameTag {
    match camera_links(room, index) {
        Some(links) => NameTag {
            name: String::new(),
            subtext: links.label,
            human_link: links.human_link,
            obs_link: links.obs_link,
            obs_screenshare_link: links.obs_screenshare_link.unwrap_or_default(),
        },
        None => blank_nametag(),
    }
}

fn blank_nametag() -> NameTag {
    NameTag {
        name: String::new(),
        subtext: String::new(),
        human_link: String::new(),
        obs_link: String::new(),
        obs_screenshare_link: String::new(),
    }
}

/// One entry per camera slot.
pub fn initialize_nametags(room: &RoomConfig) -> Vec<NameTag> {
    (0..usize::from(Slot::COUNT))
        .map(|i| default_nametag(room, i))
        .collect()
}

/// Pad to six slots and fill only the fields that are still empty.
/// Returns whether anything changed.
pub fn ensure_room_links(tags: &mut Vec<NameTag>, room: &RoomConfig) -> bool {
    let mut changed = false;
    while tags.len() < usize::from(Slot::COUNT) {
        tags.push(blank_nametag());
        changed = true;
    }

    for (index, tag) in tags.iter_mut().enumerate() {
        let Some(links) = camera_links(room, index) else {
            continue;
        };
        changed |= fill(&mut tag.human_link, links.human_link);
        changed |= fill(&mut tag.obs_link, links.obs_link);
        if let Some(screenshare) = links.obs_screenshare_link {
            changed |= fill(&mut tag.obs_screenshare_link, screenshare);
        }
        changed |= fill(&mut tag.subtext, links.label);
    }
    changed
}

fn fill(field: &mut String, value: String) -> bool {
    if field.is_empty() && !value.is_empty() {
        *field = value;
        true
    } else {
        false
    }
}
