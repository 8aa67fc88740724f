//! Point-of-interest markers drawn over the world.
//!
//! Markers come from a plain-text metadata file, one record per line:
//!
//! ```text
//! # itemType worldIndex roomIndex x,y,z
//! chest 1 4 120.5,-3,88
//! shrine 3 0 0,10,-250.25
//! ```
//!
//! World indices are 1-based in the file. Blank lines and lines starting with
//! `#` are ignored; any other malformed record fails the whole parse with its
//! line number. Parsed items are grouped by world (stable within a world) so
//! each world's markers form one contiguous instance range.

use std::ops::Range;

use crate::error::LoadError;
use crate::world::WorldId;

/// One marker.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
    /// Index into [`OverlayCatalog::kinds`].
    pub kind: u32,
    /// World the marker belongs to.
    pub world: WorldId,
    /// Room within the world.
    pub room: u32,
    /// World-space position.
    pub position: [f32; 3],
}

/// Per-instance data for the overlay draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MarkerInstance {
    /// World-space position.
    pub position: [f32; 3],
    /// Icon layer.
    pub kind: u32,
}

/// All markers of a session, grouped by world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayCatalog {
    kinds: Vec<String>,
    items: Vec<OverlayItem>,
    ranges: Vec<Range<u32>>,
}

impl OverlayCatalog {
    /// Parse metadata text for `world_count` worlds.
    pub fn parse(text: &str, world_count: usize) -> Result<Self, LoadError> {
        let mut kinds: Vec<String> = Vec::new();
        let mut parsed = Vec::new();

        for (line_index, line) in text.lines().enumerate() {
            let line_number = line_index + 1;
            let record = line.trim();
            if record.is_empty() || record.starts_with('#') {
                continue;
            }
            let (kind_name, item) = parse_record(record, line_number, world_count)?;
            let kind = match kinds.iter().position(|known| known == kind_name) {
                Some(kind) => kind,
                None => {
                    kinds.push(kind_name.to_string());
                    kinds.len() - 1
                }
            };
            parsed.push(OverlayItem {
                kind: kind as u32,
                ..item
            });
        }

        // Stable: file order is kept within each world.
        parsed.sort_by_key(|item| item.world);

        let mut ranges = vec![0..0; world_count];
        let mut start = 0u32;
        for (world, range) in ranges.iter_mut().enumerate() {
            let count = parsed
                .iter()
                .skip(start as usize)
                .take_while(|item| item.world.index() == world)
                .count() as u32;
            *range = start..start + count;
            start += count;
        }

        log::debug!(
            "Parsed {} overlay items of {} kinds across {} worlds",
            parsed.len(),
            kinds.len(),
            world_count
        );

        Ok(Self {
            kinds,
            items: parsed,
            ranges,
        })
    }

    /// An empty catalog for `world_count` worlds.
    pub fn empty(world_count: usize) -> Self {
        Self {
            kinds: Vec::new(),
            items: Vec::new(),
            ranges: vec![0..0; world_count],
        }
    }

    /// Kind names, indexed by [`OverlayItem::kind`].
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// All items, grouped by world.
    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    /// Items of one world.
    pub fn world_items(&self, world: WorldId) -> &[OverlayItem] {
        let range = self.instance_range(world);
        &self.items[range.start as usize..range.end as usize]
    }

    /// Instance range of one world's markers. Unknown worlds are empty.
    pub fn instance_range(&self, world: WorldId) -> Range<u32> {
        self.ranges.get(world.index()).cloned().unwrap_or(0..0)
    }

    /// Instance data for the overlay draw, in item order.
    pub fn instances(&self) -> Vec<MarkerInstance> {
        self.items
            .iter()
            .map(|item| MarkerInstance {
                position: item.position,
                kind: item.kind,
            })
            .collect()
    }
}

fn parse_record(
    record: &str,
    line: usize,
    world_count: usize,
) -> Result<(&str, OverlayItem), LoadError> {
    let mut fields = record.split_whitespace();
    let (Some(kind), Some(world), Some(room), Some(position)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(LoadError::metadata(
            line,
            "expected `itemType worldIndex roomIndex x,y,z`",
        ));
    };
    if let Some(extra) = fields.next() {
        return Err(LoadError::metadata(
            line,
            format!("unexpected trailing field '{extra}'"),
        ));
    }

    let world: usize = world
        .parse()
        .map_err(|_| LoadError::metadata(line, format!("invalid world index '{world}'")))?;
    if world == 0 || world > world_count {
        return Err(LoadError::metadata(
            line,
            format!("world index {world} is outside 1..={world_count}"),
        ));
    }
    let room: u32 = room
        .parse()
        .map_err(|_| LoadError::metadata(line, format!("invalid room index '{room}'")))?;

    let components: Vec<&str> = position.split(',').collect();
    let [x, y, z] = components.as_slice() else {
        return Err(LoadError::metadata(
            line,
            format!("position '{position}' must have three components"),
        ));
    };
    let mut coords = [0.0f32; 3];
    for (slot, text) in coords.iter_mut().zip([x, y, z]) {
        *slot = text.trim().parse().map_err(|_| {
            LoadError::metadata(line, format!("invalid coordinate '{text}'"))
        })?;
    }

    Ok((
        kind,
        OverlayItem {
            kind: 0,
            world: WorldId::new((world - 1) as u32),
            room,
            position: coords,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# itemType worldIndex roomIndex x,y,z
chest 2 1 1,2,3
shrine 1 0 -4.5,0,10

chest 2 3 7,8,9
key 7 2 0,0,0
";

    #[test]
    fn test_parse_groups_by_world() {
        let catalog = OverlayCatalog::parse(SAMPLE, 7).unwrap();
        assert_eq!(catalog.kinds(), &["chest", "shrine", "key"]);
        assert_eq!(catalog.items().len(), 4);

        assert_eq!(catalog.instance_range(WorldId::new(0)), 0..1);
        assert_eq!(catalog.instance_range(WorldId::new(1)), 1..3);
        assert_eq!(catalog.instance_range(WorldId::new(2)), 3..3);
        assert_eq!(catalog.instance_range(WorldId::new(6)), 3..4);

        let second = catalog.world_items(WorldId::new(1));
        assert_eq!(second[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(second[1].position, [7.0, 8.0, 9.0]);
        assert_eq!(second[1].room, 3);

        let first = &catalog.world_items(WorldId::new(0))[0];
        assert_eq!(first.kind, 1);
        assert_eq!(first.position, [-4.5, 0.0, 10.0]);
    }

    #[test]
    fn test_instances_follow_item_order() {
        let catalog = OverlayCatalog::parse(SAMPLE, 7).unwrap();
        let instances = catalog.instances();
        assert_eq!(instances.len(), 4);
        assert_eq!(instances[0].kind, 1);
        assert_eq!(instances[3].kind, 2);
        assert_eq!(std::mem::size_of::<MarkerInstance>(), 16);
    }

    #[test]
    fn test_unknown_world_range_is_empty() {
        let catalog = OverlayCatalog::parse(SAMPLE, 7).unwrap();
        assert_eq!(catalog.instance_range(WorldId::new(9)), 0..0);
        assert!(catalog.world_items(WorldId::new(9)).is_empty());
    }

    #[test]
    fn test_world_index_is_one_based() {
        let err = OverlayCatalog::parse("chest 0 1 0,0,0", 7).unwrap_err();
        assert!(err.to_string().contains("line 1"));
        let err = OverlayCatalog::parse("chest 8 1 0,0,0", 7).unwrap_err();
        assert!(err.to_string().contains("outside 1..=7"));
    }

    #[test]
    fn test_malformed_records_fail_fast() {
        let cases = [
            "chest 1 1",
            "chest one 1 0,0,0",
            "chest 1 x 0,0,0",
            "chest 1 1 0,0",
            "chest 1 1 0,zero,0",
            "chest 1 1 0,0,0 extra",
        ];
        for case in cases {
            let text = format!("# header\n{case}\n");
            match OverlayCatalog::parse(&text, 7) {
                Err(LoadError::Metadata { line, .. }) => assert_eq!(line, 2, "case {case}"),
                other => panic!("case {case}: expected metadata error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = OverlayCatalog::empty(3);
        assert!(catalog.items().is_empty());
        assert_eq!(catalog.instance_range(WorldId::new(2)), 0..0);
    }
}
