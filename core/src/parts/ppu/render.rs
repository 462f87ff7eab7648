//! Per-scanline pixel composition: windows, sprites, backgrounds, layer
//! selection, and color special effects, evaluated one column at a time.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#lcdiobgcontrol> and
//! the surrounding OBJ/window/blend sections.

use gba_arch::reg::Register as _;

use super::{oam::Mode as ObjMode, BldCnt, Ppu};

const WIDTH: usize = super::WIDTH;
const OBJ_CHAR_BASE: usize = 0x1_0000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Kind {
    Bg(u8),
    Obj,
    Backdrop,
}

#[derive(Clone, Copy)]
struct Layer {
    rgb: u16,
    priority: u8,
    kind: Kind,
    semi_transparent: bool,
}

pub(super) fn render_line(ppu: &Ppu, y: u8, out: &mut [u16]) {
    let dispcnt = ppu.dispcnt.borrow();
    let mode = dispcnt.bg_mode();
    let bg_on = [
        dispcnt.bg0_on(),
        dispcnt.bg1_on(),
        dispcnt.bg2_on(),
        dispcnt.bg3_on(),
    ];
    let obj_on = dispcnt.obj_on();
    let win0_on = dispcnt.win0_on();
    let win1_on = dispcnt.win1_on();
    let objwin_on = dispcnt.obj_win_on();
    let obj_1d = dispcnt.obj_1d();
    let frame_sel = dispcnt.frame_select();
    drop(dispcnt);

    let any_window = win0_on || win1_on || objwin_on;

    let mut obj_layer: [Option<Layer>; WIDTH] = [None; WIDTH];
    let mut obj_window: [bool; WIDTH] = [false; WIDTH];
    if obj_on {
        evaluate_sprites(ppu, y, obj_1d, &mut obj_layer, &mut obj_window);
    }

    let bldcnt = ppu.bldcnt.borrow();
    let backdrop = ppu.palette.borrow().bg.raw(0);

    for (x, slot) in out.iter_mut().enumerate() {
        let enable = if !any_window {
            [true; 6]
        } else {
            let in0 = win0_on && in_rect(ppu.win0h.borrow().load(), ppu.win0v.borrow().load(), x as u16, y);
            let in1 = win1_on && in_rect(ppu.win1h.borrow().load(), ppu.win1v.borrow().load(), x as u16, y);
            if in0 {
                window_mask(ppu.winin.borrow().load() & 0x3f)
            } else if in1 {
                window_mask((ppu.winin.borrow().load() >> 8) & 0x3f)
            } else if objwin_on && obj_window[x] {
                window_mask((ppu.winout.borrow().load() >> 8) & 0x3f)
            } else {
                window_mask(ppu.winout.borrow().load() & 0x3f)
            }
        };

        let mut layers: [Option<Layer>; 5] = [None; 5];
        for (idx, layer) in layers.iter_mut().enumerate().take(4) {
            if !bg_on[idx] || !enable[idx] {
                continue;
            }
            if let Some((rgb, priority)) = bg_pixel(ppu, idx, mode, frame_sel, x, y) {
                *layer = Some(Layer {
                    rgb,
                    priority,
                    kind: Kind::Bg(u8::try_from(idx).unwrap()),
                    semi_transparent: false,
                });
            }
        }
        if enable[4] {
            layers[4] = obj_layer[x];
        }

        let mut stack: Vec<Layer> = layers.into_iter().flatten().collect();
        stack.push(Layer {
            rgb: backdrop,
            priority: 4,
            kind: Kind::Backdrop,
            semi_transparent: false,
        });
        stack.sort_by_key(|l| (l.priority, rank(l.kind)));

        let top = stack[0];
        let rgb = if !enable[5] {
            top.rgb
        } else if top.semi_transparent {
            match stack[1..].iter().find(|l| is_2nd_target(&bldcnt, l.kind)) {
                Some(&bottom) => blend(top.rgb, bottom.rgb, ppu.bldalpha.borrow().eva(), ppu.bldalpha.borrow().evb()),
                None => top.rgb,
            }
        } else if is_1st_target(&bldcnt, top.kind) {
            match super::Effect::from(bldcnt.effect()) {
                super::Effect::None => top.rgb,
                super::Effect::AlphaBlend => {
                    match stack[1..].iter().find(|l| is_2nd_target(&bldcnt, l.kind)) {
                        Some(&bottom) => {
                            blend(top.rgb, bottom.rgb, ppu.bldalpha.borrow().eva(), ppu.bldalpha.borrow().evb())
                        }
                        None => top.rgb,
                    }
                }
                super::Effect::BrightnessUp => brighten(top.rgb, ppu.bldy.borrow().evy(), true),
                super::Effect::BrightnessDown => brighten(top.rgb, ppu.bldy.borrow().evy(), false),
            }
        } else {
            top.rgb
        };

        *slot = rgb;
    }
}

/// Tie-break order among layers of equal priority: a sprite beats a
/// background, and the backdrop is always the last resort.
fn rank(kind: Kind) -> u8 {
    match kind {
        Kind::Obj => 0,
        Kind::Bg(n) => n + 1,
        Kind::Backdrop => 5,
    }
}

fn is_1st_target(bldcnt: &BldCnt, kind: Kind) -> bool {
    match kind {
        Kind::Bg(0) => bldcnt.bg0_1st(),
        Kind::Bg(1) => bldcnt.bg1_1st(),
        Kind::Bg(2) => bldcnt.bg2_1st(),
        Kind::Bg(3) => bldcnt.bg3_1st(),
        Kind::Bg(_) => false,
        Kind::Obj => bldcnt.obj_1st(),
        Kind::Backdrop => bldcnt.bd_1st(),
    }
}

fn is_2nd_target(bldcnt: &BldCnt, kind: Kind) -> bool {
    match kind {
        Kind::Bg(0) => bldcnt.bg0_2nd(),
        Kind::Bg(1) => bldcnt.bg1_2nd(),
        Kind::Bg(2) => bldcnt.bg2_2nd(),
        Kind::Bg(3) => bldcnt.bg3_2nd(),
        Kind::Bg(_) => false,
        Kind::Obj => bldcnt.obj_2nd(),
        Kind::Backdrop => bldcnt.bd_2nd(),
    }
}

fn split(c: u16) -> (u32, u32, u32) {
    (u32::from(c & 0x1f), u32::from((c >> 5) & 0x1f), u32::from((c >> 10) & 0x1f))
}

fn combine(r: u32, g: u32, b: u32) -> u16 {
    (r.min(31) as u16) | ((g.min(31) as u16) << 5) | ((b.min(31) as u16) << 10)
}

fn blend(a: u16, b: u16, eva: u32, evb: u32) -> u16 {
    let (ar, ag, ab) = split(a);
    let (br, bg, bb) = split(b);
    combine(
        (ar * eva + br * evb) / 16,
        (ag * eva + bg * evb) / 16,
        (ab * eva + bb * evb) / 16,
    )
}

fn brighten(c: u16, evy: u32, up: bool) -> u16 {
    let (r, g, b) = split(c);
    let apply = |c: u32| -> u32 {
        if up {
            c + ((31 - c) * evy) / 16
        } else {
            c - (c * evy) / 16
        }
    };
    combine(apply(r), apply(g), apply(b))
}

fn window_mask(bits: u16) -> [bool; 6] {
    std::array::from_fn(|i| bits & (1 << i) != 0)
}

fn in_rect(h: u16, v: u16, x: u16, y: u8) -> bool {
    let (x1, x2) = (h >> 8, h & 0xff);
    let (y1, y2) = (v >> 8, v & 0xff);
    in_range_wrap(x1, x2, x) && in_range_wrap(y1, y2, u16::from(y))
}

fn in_range_wrap(lo: u16, hi: u16, v: u16) -> bool {
    if lo <= hi {
        v >= lo && v < hi
    } else {
        v >= lo || v < hi
    }
}

/// Computes BG `idx`'s pixel at `(x, y)`, or `None` if transparent/not
/// applicable to the current mode, alongside its `BGxCNT` priority.
fn bg_pixel(ppu: &Ppu, idx: usize, mode: u8, frame_sel: bool, x: usize, y: u8) -> Option<(u16, u8)> {
    match mode {
        0 => text_bg_pixel(ppu, idx, x, y),
        1 if idx < 2 => text_bg_pixel(ppu, idx, x, y),
        1 if idx == 2 => affine_bg_pixel(ppu, 0, x, y),
        2 if idx == 2 => affine_bg_pixel(ppu, 0, x, y),
        2 if idx == 3 => affine_bg_pixel(ppu, 1, x, y),
        3 if idx == 2 => bitmap3_pixel(ppu, x, y),
        4 if idx == 2 => bitmap4_pixel(ppu, x, y, frame_sel),
        5 if idx == 2 => bitmap5_pixel(ppu, x, y, frame_sel),
        _ => None,
    }
}

fn text_bg_pixel(ppu: &Ppu, idx: usize, x: usize, y: u8) -> Option<(u16, u8)> {
    let bg = &ppu.bg[idx];
    let cnt = bg.cnt.borrow();
    let priority = cnt.priority();
    let (mosaic_h, mosaic_v) = if cnt.mosaic() {
        let m = ppu.mosaic.borrow();
        (u32::from(m.bg_h()) + 1, u32::from(m.bg_v()) + 1)
    } else {
        (1, 1)
    };
    let raw_sx = u32::try_from(x).unwrap() + u32::from(bg.hofs.borrow().load());
    let raw_sy = u32::from(y) + u32::from(bg.vofs.borrow().load());
    let sx = (raw_sx / mosaic_h) * mosaic_h;
    let sy = (raw_sy / mosaic_v) * mosaic_v;

    let (map_w, map_h) = match cnt.screen_size() {
        0 => (256u32, 256u32),
        1 => (512, 256),
        2 => (256, 512),
        _ => (512, 512),
    };
    let sx = sx % map_w;
    let sy = sy % map_h;
    let block = match cnt.screen_size() {
        0 => 0,
        1 => sx / 256,
        2 => sy / 256,
        _ => (sy / 256) * 2 + sx / 256,
    };
    let (tx, ty) = (sx % 256 / 8, sy % 256 / 8);
    let block_base = usize::from(cnt.screen_base()) * 0x800 + (block as usize) * 0x800;
    let map_off = block_base + ((ty * 32 + tx) * 2) as usize;

    let vram = ppu.vram.borrow();
    let entry = vram.hword(map_off);
    let tile_num = entry & 0x03ff;
    let h_flip = entry & 0x0400 != 0;
    let v_flip = entry & 0x0800 != 0;
    let palette_no = (entry >> 12) & 0x0f;

    let mut px = sx % 8;
    let mut py = sy % 8;
    if h_flip {
        px = 7 - px;
    }
    if v_flip {
        py = 7 - py;
    }

    let char_base = usize::from(cnt.char_base()) * 0x4000;
    let bg_ram = ppu.palette.borrow();
    if cnt.bpp8() {
        let tile_addr = char_base + usize::from(tile_num) * 64 + (py * 8 + px) as usize;
        let index = vram.byte(tile_addr);
        if index == 0 {
            None
        } else {
            Some((bg_ram.bg.raw(usize::from(index)), priority))
        }
    } else {
        let tile_addr = char_base + usize::from(tile_num) * 32 + (py * 4 + px / 2) as usize;
        let byte = vram.byte(tile_addr);
        let nibble = if px % 2 == 0 { byte & 0xf } else { byte >> 4 };
        if nibble == 0 {
            None
        } else {
            let index = usize::from(palette_no) * 16 + usize::from(nibble);
            Some((bg_ram.bg.raw(index), priority))
        }
    }
}

/// Maps a screen column to an affine BG's texture coordinate (in 8.8
/// fixed point) per the standard rotation/scaling formula, returning the
/// BG-pixel if in range (or wrapped, per the layer's overflow setting).
fn affine_bg_pixel(ppu: &Ppu, affine_idx: usize, x: usize, _y: u8) -> Option<(u16, u8)> {
    let bg_idx = 2 + affine_idx;
    let cnt = ppu.bg[bg_idx].cnt.borrow();
    let priority = cnt.priority();
    let affine = &ppu.affine[affine_idx];
    let pa = affine.pa.borrow().signed();
    let pc = affine.pc.borrow().signed();

    let tex_x = affine.cur_x + x as i32 * pa;
    let tex_y = affine.cur_y + x as i32 * pc;
    let (tex_x, tex_y) = (tex_x >> 8, tex_y >> 8);

    let tiles = match cnt.screen_size() {
        0 => 16i32,
        1 => 32,
        2 => 64,
        _ => 128,
    };
    let map_px = tiles * 8;

    let (tex_x, tex_y) = if cnt.overflow_wrap() {
        (tex_x.rem_euclid(map_px), tex_y.rem_euclid(map_px))
    } else {
        if tex_x < 0 || tex_y < 0 || tex_x >= map_px || tex_y >= map_px {
            return None;
        }
        (tex_x, tex_y)
    };

    let (tile_x, tile_y) = (tex_x / 8, tex_y / 8);
    let (px, py) = (tex_x % 8, tex_y % 8);
    let map_off = usize::from(cnt.screen_base()) * 0x800 + (tile_y * tiles + tile_x) as usize;
    let vram = ppu.vram.borrow();
    let tile_num = vram.byte(map_off);
    let char_base = usize::from(cnt.char_base()) * 0x4000;
    let tile_addr = char_base + usize::from(tile_num) * 64 + (py * 8 + px) as usize;
    let index = vram.byte(tile_addr);
    if index == 0 {
        None
    } else {
        Some((ppu.palette.borrow().bg.raw(usize::from(index)), priority))
    }
}

fn bitmap3_pixel(ppu: &Ppu, x: usize, y: u8) -> Option<(u16, u8)> {
    let priority = ppu.bg[2].cnt.borrow().priority();
    let addr = (usize::from(y) * WIDTH + x) * 2;
    Some((ppu.vram.borrow().hword(addr) & 0x7fff, priority))
}

fn bitmap4_pixel(ppu: &Ppu, x: usize, y: u8, frame_sel: bool) -> Option<(u16, u8)> {
    let priority = ppu.bg[2].cnt.borrow().priority();
    let base = if frame_sel { 0xa000 } else { 0 };
    let index = ppu.vram.borrow().byte(base + usize::from(y) * WIDTH + x);
    if index == 0 {
        None
    } else {
        Some((ppu.palette.borrow().bg.raw(usize::from(index)), priority))
    }
}

fn bitmap5_pixel(ppu: &Ppu, x: usize, y: u8, frame_sel: bool) -> Option<(u16, u8)> {
    const MODE5_W: usize = 160;
    const MODE5_H: usize = 128;
    if x >= MODE5_W || usize::from(y) >= MODE5_H {
        return None;
    }
    let priority = ppu.bg[2].cnt.borrow().priority();
    let base = if frame_sel { 0xa000 } else { 0 };
    let addr = base + (usize::from(y) * MODE5_W + x) * 2;
    Some((ppu.vram.borrow().hword(addr) & 0x7fff, priority))
}

fn evaluate_sprites(
    ppu: &Ppu,
    y: u8,
    obj_1d: bool,
    obj_layer: &mut [Option<Layer>; WIDTH],
    obj_window: &mut [bool; WIDTH],
) {
    let oam = ppu.oam.borrow();
    let vram = ppu.vram.borrow();
    let palette = ppu.palette.borrow();
    let mosaic = ppu.mosaic.borrow();

    for i in 0..oam.len() {
        let sprite = oam.sprite(i);
        if matches!(sprite.mode, ObjMode::Disabled) {
            continue;
        }
        let (half_w, half_h) = sprite.half_extent();
        let total_w = half_w * 2;
        let total_h = half_h * 2;

        let mut top = i32::from(sprite.y);
        if top + total_h > 256 {
            top -= 256;
        }
        let y_i32 = i32::from(y);
        if y_i32 < top || y_i32 >= top + total_h {
            continue;
        }

        let mut left = i32::from(sprite.x);
        if left + total_w > 512 {
            left -= 512;
        }

        let (cx, cy) = (i32::try_from(sprite.width).unwrap() / 2, i32::try_from(sprite.height).unwrap() / 2);

        for sx in 0..total_w {
            let screen_x = left + sx;
            if !(0..WIDTH as i32).contains(&screen_x) {
                continue;
            }
            let screen_x = screen_x as usize;

            let (tex_x, tex_y) = if sprite.affine {
                let group = oam.affine(usize::from(sprite.affine_group));
                let dx = sx - half_w;
                let dy = y_i32 - top - half_h;
                let tx = cx + ((group.pa * dx + group.pb * dy) >> 8);
                let ty = cy + ((group.pc * dx + group.pd * dy) >> 8);
                (tx, ty)
            } else {
                let mut tx = sx;
                let mut ty = y_i32 - top;
                if sprite.h_flip {
                    tx = i32::try_from(sprite.width).unwrap() - 1 - tx;
                }
                if sprite.v_flip {
                    ty = i32::try_from(sprite.height).unwrap() - 1 - ty;
                }
                (tx, ty)
            };

            if tex_x < 0 || tex_y < 0 || tex_x >= i32::try_from(sprite.width).unwrap() || tex_y >= i32::try_from(sprite.height).unwrap() {
                continue;
            }
            let (mut tex_x, mut tex_y) = (tex_x, tex_y);
            if sprite.mosaic {
                let mh = i32::from(mosaic.obj_h()) + 1;
                let mv = i32::from(mosaic.obj_v()) + 1;
                tex_x -= tex_x.rem_euclid(mh);
                tex_y -= tex_y.rem_euclid(mv);
            }

            let tiles_per_row = sprite.width / 8;
            let (tile_x, tile_y) = (tex_x / 8, tex_y / 8);
            let (px, py) = (tex_x % 8, tex_y % 8);
            let step = if sprite.bpp8 { 2 } else { 1 };
            let tile_index: i32 = i32::from(sprite.tile)
                + if obj_1d {
                    tile_y * i32::try_from(tiles_per_row).unwrap() + tile_x
                } else {
                    tile_y * 32 + tile_x * step
                };
            let tile_base = OBJ_CHAR_BASE + (tile_index as usize) * 32;

            let rgb = if sprite.bpp8 {
                let addr = tile_base + (py * 8 + px) as usize;
                let index = vram.byte(addr);
                (index != 0).then(|| palette.obj.raw(usize::from(index)))
            } else {
                let addr = tile_base + (py * 4 + px / 2) as usize;
                let byte = vram.byte(addr);
                let nibble = if px % 2 == 0 { byte & 0xf } else { byte >> 4 };
                (nibble != 0).then(|| palette.obj.raw(usize::from(sprite.palette) * 16 + usize::from(nibble)))
            };

            let Some(rgb) = rgb else { continue };

            if matches!(sprite.mode, ObjMode::Window) {
                obj_window[screen_x] = true;
                continue;
            }

            let better = obj_layer[screen_x].map_or(true, |cur| sprite.priority < cur.priority);
            if better {
                obj_layer[screen_x] = Some(Layer {
                    rgb,
                    priority: sprite.priority,
                    kind: Kind::Obj,
                    semi_transparent: matches!(sprite.mode, ObjMode::SemiTransparent),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gba_arch::mem::Memory;
    use gba_arch::reg::Register as _;
    use gba_arch::Word;

    use super::*;
    use crate::parts::pic::Pic;

    fn ppu() -> Ppu {
        let pic = Pic::new();
        Ppu::new(pic.line())
    }

    fn write_bg_palette(ppu: &Ppu, index: usize, color: u16) {
        let mut palette = ppu.palette.borrow_mut();
        palette.write((index * 2) as Word, color as u8).unwrap();
        palette.write((index * 2 + 1) as Word, (color >> 8) as u8).unwrap();
    }

    fn write_obj_palette(ppu: &Ppu, index: usize, color: u16) {
        let base = 0x200 + index * 2;
        let mut palette = ppu.palette.borrow_mut();
        palette.write(base as Word, color as u8).unwrap();
        palette.write(base as Word + 1, (color >> 8) as u8).unwrap();
    }

    #[test]
    fn window_mask_unpacks_six_bits() {
        assert_eq!(window_mask(0b0010_1011), [true, true, false, true, false, true]);
    }

    #[test]
    fn in_range_wrap_handles_non_wrapping_and_wrapping_ranges() {
        assert!(in_range_wrap(10, 20, 15));
        assert!(!in_range_wrap(10, 20, 25));
        assert!(in_range_wrap(200, 10, 250));
        assert!(in_range_wrap(200, 10, 5));
        assert!(!in_range_wrap(200, 10, 100));
    }

    #[test]
    fn blend_with_full_top_weight_is_unchanged() {
        let color = combine(10, 20, 31);
        assert_eq!(blend(color, 0, 16, 0), color);
    }

    #[test]
    fn brighten_up_to_max_saturates_white() {
        let color = combine(10, 10, 10);
        assert_eq!(brighten(color, 16, true), combine(31, 31, 31));
    }

    #[test]
    fn brighten_down_to_max_saturates_black() {
        let color = combine(10, 10, 10);
        assert_eq!(brighten(color, 16, false), 0);
    }

    #[test]
    fn text_bg_pixel_fetches_tile_through_map_and_palette() {
        let ppu = ppu();
        ppu.bg[0].cnt.borrow_mut().store(0); // char_base 0, screen_base 0, 4bpp
        write_bg_palette(&ppu, 5, 0x1234 & 0x7fff);

        {
            let mut vram = ppu.vram.borrow_mut();
            // Map entry for tile (0,0): tile number 1, no flip, palette 0.
            vram.write(0, 1).unwrap();
            vram.write(1, 0).unwrap();
            // Tile 1's pixel (0,0) is the low nibble of its first byte.
            let tile_addr = 1 * 32;
            vram.write(tile_addr as Word, 5).unwrap();
        }

        let (rgb, priority) = text_bg_pixel(&ppu, 0, 0, 0).unwrap();
        assert_eq!(rgb, 0x1234 & 0x7fff);
        assert_eq!(priority, 0);
    }

    #[test]
    fn text_bg_pixel_is_transparent_on_index_zero() {
        let ppu = ppu();
        ppu.bg[0].cnt.borrow_mut().store(0);
        assert!(text_bg_pixel(&ppu, 0, 0, 0).is_none());
    }

    #[test]
    fn affine_bg_pixel_identity_transform_reads_straight_through() {
        let ppu = ppu();
        ppu.bg[2].cnt.borrow_mut().store(0); // screen_size 0 -> 128x128, char/screen base 0
        ppu.affine[0].pa.borrow_mut().store(0x0100);
        ppu.affine[0].pd.borrow_mut().store(0x0100);
        ppu.affine[0].cur_x = 0;
        ppu.affine[0].cur_y = 0;

        write_bg_palette(&ppu, 7, 0x0210);
        {
            let mut vram = ppu.vram.borrow_mut();
            vram.write(0, 1).unwrap(); // affine map entries are one byte each
            let tile_addr = 1 * 64; // 8bpp tile
            vram.write(tile_addr as Word, 7).unwrap();
        }

        let (rgb, _priority) = affine_bg_pixel(&ppu, 0, 0, 0).unwrap();
        assert_eq!(rgb, 0x0210);
    }

    #[test]
    fn affine_bg_pixel_clips_out_of_range_when_not_wrapping() {
        let ppu = ppu();
        ppu.bg[2].cnt.borrow_mut().store(0);
        ppu.affine[0].cur_x = -1 << 8;
        assert!(affine_bg_pixel(&ppu, 0, 0, 0).is_none());
    }

    #[test]
    fn bitmap3_pixel_reads_direct_color_at_scanline_offset() {
        let ppu = ppu();
        ppu.vram.borrow_mut().write(2, 0x34).unwrap();
        ppu.vram.borrow_mut().write(3, 0x7f).unwrap();
        let (rgb, _) = bitmap3_pixel(&ppu, 1, 0).unwrap();
        assert_eq!(rgb, 0x7f34);
    }

    #[test]
    fn bitmap4_pixel_selects_frame_buffer_by_select_bit() {
        let ppu = ppu();
        ppu.vram.borrow_mut().write(0xa000, 9).unwrap();
        write_bg_palette(&ppu, 9, 0x0055);
        assert!(bitmap4_pixel(&ppu, 0, 0, false).is_none());
        let (rgb, _) = bitmap4_pixel(&ppu, 0, 0, true).unwrap();
        assert_eq!(rgb, 0x0055);
    }

    fn sprite_bytes(y: u8, x: u16, tile: u16, bpp8: bool) -> [u8; 8] {
        let attr0 = u16::from(y);
        let attr1 = x & 0x01ff;
        let mut attr0 = attr0;
        if bpp8 {
            attr0 |= 0x2000;
        }
        let attr2 = tile & 0x03ff;
        [
            attr0 as u8,
            (attr0 >> 8) as u8,
            attr1 as u8,
            (attr1 >> 8) as u8,
            attr2 as u8,
            (attr2 >> 8) as u8,
            0,
            0,
        ]
    }

    #[test]
    fn evaluate_sprites_draws_basic_4bpp_sprite() {
        let ppu = ppu();
        {
            let mut oam = ppu.oam.borrow_mut();
            let bytes = sprite_bytes(10, 20, 2, false);
            for (i, b) in bytes.iter().enumerate() {
                oam.write(i as Word, *b).unwrap();
            }
        }
        write_obj_palette(&ppu, 3, 0x2222);
        {
            let mut vram = ppu.vram.borrow_mut();
            let tile_addr = OBJ_CHAR_BASE + 2 * 32;
            vram.write(tile_addr as Word, 3).unwrap(); // low nibble = index 3
        }

        let mut obj_layer: [Option<Layer>; WIDTH] = [None; WIDTH];
        let mut obj_window = [false; WIDTH];
        evaluate_sprites(&ppu, 10, true, &mut obj_layer, &mut obj_window);

        let layer = obj_layer[20].expect("sprite pixel drawn");
        assert_eq!(layer.rgb, 0x2222);
        assert!(!obj_window[20]);
    }

    #[test]
    fn evaluate_sprites_window_mode_sets_mask_without_drawing() {
        let ppu = ppu();
        {
            let mut oam = ppu.oam.borrow_mut();
            let mut bytes = sprite_bytes(0, 0, 0, false);
            bytes[1] |= 0x08; // OBJ mode bits 10-11 = 10 (Window)
            for (i, b) in bytes.iter().enumerate() {
                oam.write(i as Word, *b).unwrap();
            }
        }
        write_obj_palette(&ppu, 1, 0x1111);
        ppu.vram
            .borrow_mut()
            .write(OBJ_CHAR_BASE as Word, 1)
            .unwrap();

        let mut obj_layer: [Option<Layer>; WIDTH] = [None; WIDTH];
        let mut obj_window = [false; WIDTH];
        evaluate_sprites(&ppu, 0, true, &mut obj_layer, &mut obj_window);

        assert!(obj_window[0]);
        assert!(obj_layer[0].is_none());
    }

    #[test]
    fn render_line_mode3_prefers_bg2_over_backdrop() {
        let ppu = ppu();
        ppu.dispcnt.borrow_mut().store(0); // mode 0, all BGs off; we override below
        {
            let mut cnt = ppu.dispcnt.borrow_mut();
            cnt.set_bg_mode(3);
            cnt.set_bg2_on(true);
        }
        ppu.vram.borrow_mut().write(0, 0x34).unwrap();
        ppu.vram.borrow_mut().write(1, 0x7f).unwrap();

        let mut out = [0u16; WIDTH];
        render_line(&ppu, 0, &mut out);
        assert_eq!(out[0], 0x7f34);
    }

    #[test]
    fn rank_breaks_equal_priority_ties_in_favor_of_sprites() {
        let mut stack = vec![
            Layer { rgb: 0, priority: 2, kind: Kind::Bg(0), semi_transparent: false },
            Layer { rgb: 0, priority: 2, kind: Kind::Obj, semi_transparent: false },
        ];
        stack.sort_by_key(|l| (l.priority, rank(l.kind)));
        assert_eq!(stack[0].kind, Kind::Obj, "a sprite beats a BG of equal priority");
    }
}
