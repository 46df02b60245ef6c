use std::fmt::Write as _;

use territory_defense_core::{GroupId, MapSnapshot, TileSnapshot};

/// Draws `snapshot` as a character grid followed by one line per held tile.
///
/// `.` marks an unowned tile, `x` a destroyed one and a letter the owning
/// group (`A` for group #1). Missing tile records are left blank.
pub(crate) fn render(snapshot: &MapSnapshot) -> String {
    let side = snapshot.side;
    let mut grid = vec![vec![' '; side as usize]; side as usize];
    for tile in &snapshot.tiles {
        let (x, y) = (tile.coord.x() as usize, tile.coord.y() as usize);
        if let Some(cell) = grid.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = glyph(tile);
        }
    }

    let mut out = String::new();
    let state = if snapshot.locked { "locked" } else { "open" };
    let _ = writeln!(out, "map {} ({side}x{side}, {state})", snapshot.map);
    for row in grid {
        out.extend(row);
        out.push('\n');
    }
    for tile in snapshot.tiles.iter().filter(|tile| tile.owner.is_some()) {
        let _ = write!(out, "{} {}", tile.coord, glyph(tile));
        for wall in &tile.walls {
            let _ = write!(
                out,
                " {}:{}",
                wall.direction.label().chars().next().unwrap_or('?'),
                wall.health
            );
            if !wall.ammunition.is_empty() {
                let layers: u32 = wall.ammunition.iter().map(|instance| instance.health).sum();
                let _ = write!(out, "+{layers}");
            }
        }
        out.push('\n');
    }
    out
}

fn glyph(tile: &TileSnapshot) -> char {
    match (tile.destroyed, tile.owner) {
        (true, _) => 'x',
        (false, None) => '.',
        (false, Some(group)) => group_letter(group),
    }
}

fn group_letter(group: GroupId) -> char {
    let offset = group.get().saturating_sub(1) % 26;
    char::from(b'A' + offset as u8)
}
