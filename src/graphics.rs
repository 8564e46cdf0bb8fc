use crate::event::Point;
use image::{Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::rc::Rc;

/// The display context used as the visible screen target.
pub const DC_SCREEN: usize = 0;
/// The display context used as the staging buffer for transitions.
pub const DC_STAGING: usize = 1;
/// How many display contexts the scenario can address.
const DC_COUNT: usize = 16;

/// A width/height pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Size { width, height }
    }
}

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Builds from position and size (the "rec" coordinate convention).
    pub fn rec(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds from two corners (the "grp" coordinate convention used by the
    /// four-coordinate #SEL source rectangles).
    pub fn grp(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Rect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }

    /// The overlapping region of two rectangles, if any.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        if x2 > x1 && y2 > y1 {
            Some(Rect::grp(x1, y1, x2, y2))
        } else {
            None
        }
    }
}

/// Per-blit opacity: either one value for the whole quad or one per corner
/// (top-left, top-right, bottom-right, bottom-left), interpolated bilinearly.
/// The corner form draws the soft edges of interpolated wipes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Opacity {
    Uniform(u8),
    Corners([u8; 4]),
}

impl Opacity {
    /// The opacity at normalised coordinates (u, v) within the quad.
    fn at(&self, u: f32, v: f32) -> u8 {
        match self {
            Opacity::Uniform(a) => *a,
            Opacity::Corners([tl, tr, br, bl]) => {
                let top = *tl as f32 + (*tr as f32 - *tl as f32) * u;
                let bottom = *bl as f32 + (*br as f32 - *bl as f32) * u;
                (top + (bottom - top) * v).round().clamp(0.0, 255.0) as u8
            }
        }
    }
}

/// A named sub-rectangle of a surface with its anchor point, as recorded in
/// image region tables.  Objects pick their source area by region index.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SurfaceRegion {
    pub rect: Rect,
    pub anchor: Point,
}

/// A rectangle of RGBA pixels plus its region table.
///
/// All surface-to-surface and surface-to-screen drawing funnels through
/// [Surface::blit_to], which scales (nearest-neighbour), clips and
/// alpha-blends in one pass so that every caller composes identically.
#[derive(Clone)]
pub struct Surface {
    pixels: RgbaImage,
    regions: Vec<SurfaceRegion>,
}

impl Surface {
    /// Constructor returning a fully transparent surface of the given size.
    pub fn new(width: i32, height: i32) -> Self {
        Surface {
            pixels: RgbaImage::new(width.max(1) as u32, height.max(1) as u32),
            regions: Vec::new(),
        }
    }

    /// Wraps decoded image data as a surface.
    pub fn from_image(pixels: RgbaImage) -> Self {
        Surface {
            pixels,
            regions: Vec::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.pixels.width() as i32
    }

    pub fn height(&self) -> i32 {
        self.pixels.height() as i32
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// The surface's full extent as a rectangle at the origin.
    pub fn rect(&self) -> Rect {
        Rect::rec(0, 0, self.width(), self.height())
    }

    pub fn set_regions(&mut self, regions: Vec<SurfaceRegion>) {
        self.regions = regions;
    }

    /// Returns the region table entry for `pattern_no`; pattern 0 of a
    /// surface without a table is the whole surface.
    pub fn pattern(&self, pattern_no: usize) -> SurfaceRegion {
        self.regions
            .get(pattern_no)
            .copied()
            .unwrap_or(SurfaceRegion {
                rect: self.rect(),
                anchor: Point::default(),
            })
    }

    /// Fills the whole surface with one colour.
    pub fn fill(&mut self, r: u8, g: u8, b: u8, a: u8) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([r, g, b, a]);
        }
    }

    /// Fills a rectangle with one colour, clipped to the surface.
    pub fn fill_rect(&mut self, rect: Rect, r: u8, g: u8, b: u8, a: u8) {
        let clipped = match rect.intersect(&self.rect()) {
            Some(c) => c,
            None => return,
        };
        for y in clipped.y..clipped.y + clipped.height {
            for x in clipped.x..clipped.x + clipped.width {
                self.pixels.put_pixel(x as u32, y as u32, Rgba([r, g, b, a]));
            }
        }
    }

    /// The raw RGBA bytes, row-major, for host texture upload.
    pub fn raw_rgba(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Returns the pixel at (x, y); out-of-range reads come back transparent.
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return [0, 0, 0, 0];
        }
        self.pixels.get_pixel(x as u32, y as u32).0
    }

    /// Like [Surface::blit_to] but adding the source into the destination
    /// (saturating), the blend the scenario's additive composite mode asks
    /// for.
    pub fn blit_to_additive(&self, dst: &mut Surface, src_rect: Rect, dst_rect: Rect, alpha: u8) {
        if src_rect.is_empty() || dst_rect.is_empty() {
            return;
        }
        let clipped = match dst_rect.intersect(&dst.rect()) {
            Some(c) => c,
            None => return,
        };
        for dy in clipped.y..clipped.y + clipped.height {
            for dx in clipped.x..clipped.x + clipped.width {
                let u = (dx - dst_rect.x) as f32 / dst_rect.width as f32;
                let v = (dy - dst_rect.y) as f32 / dst_rect.height as f32;
                let sx = src_rect.x + (u * src_rect.width as f32) as i32;
                let sy = src_rect.y + (v * src_rect.height as f32) as i32;
                let src = self.pixel(sx, sy);
                let gain = (src[3] as u32 * alpha as u32) / 255;
                if gain == 0 {
                    continue;
                }
                let dst_pixel = dst.pixels.get_pixel_mut(dx as u32, dy as u32);
                for c in 0..3 {
                    let added = dst_pixel.0[c] as u32 + src[c] as u32 * gain / 255;
                    dst_pixel.0[c] = added.min(255) as u8;
                }
            }
        }
    }

    /// Draws `src_rect` of this surface into `dst_rect` of `dst`, scaling
    /// nearest-neighbour when the rectangles differ in size, and blending
    /// with the given opacity on top of the source's own alpha.
    pub fn blit_to(&self, dst: &mut Surface, src_rect: Rect, dst_rect: Rect, opacity: Opacity) {
        if src_rect.is_empty() || dst_rect.is_empty() {
            return;
        }
        let clipped = match dst_rect.intersect(&dst.rect()) {
            Some(c) => c,
            None => return,
        };
        for dy in clipped.y..clipped.y + clipped.height {
            for dx in clipped.x..clipped.x + clipped.width {
                // Normalised position within the destination quad.
                let u = (dx - dst_rect.x) as f32 / dst_rect.width as f32;
                let v = (dy - dst_rect.y) as f32 / dst_rect.height as f32;
                let sx = src_rect.x + (u * src_rect.width as f32) as i32;
                let sy = src_rect.y + (v * src_rect.height as f32) as i32;
                let src = self.pixel(sx, sy);
                let alpha = (src[3] as u32 * opacity.at(u, v) as u32) / 255;
                if alpha == 0 {
                    continue;
                }
                let dst_pixel = dst.pixels.get_pixel_mut(dx as u32, dy as u32);
                let inverse = 255 - alpha;
                for c in 0..3 {
                    dst_pixel.0[c] =
                        ((src[c] as u32 * alpha + dst_pixel.0[c] as u32 * inverse) / 255) as u8;
                }
                dst_pixel.0[3] = dst_pixel.0[3].max(alpha as u8);
            }
        }
    }
}

/// How an object's pixels combine with what is already composited.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CompositeMode {
    #[default]
    Normal,
    Additive,
}

/// The colour/tone filters an object applies to its source pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ObjectFilters {
    /// Per-channel tint, applied multiplicatively around the 128 midpoint.
    pub tint: Option<[u8; 3]>,
    /// Greyscale when non-zero.
    pub mono: i32,
    /// Channel inversion when non-zero.
    pub invert: i32,
    /// Additive brightness.
    pub light: i32,
}

impl ObjectFilters {
    fn apply(&self, mut rgb: [u8; 3]) -> [u8; 3] {
        if self.invert != 0 {
            for c in rgb.iter_mut() {
                *c = 255 - *c;
            }
        }
        if self.mono != 0 {
            let luma =
                (rgb[0] as u32 * 77 + rgb[1] as u32 * 151 + rgb[2] as u32 * 28) >> 8;
            rgb = [luma as u8; 3];
        }
        if let Some(tint) = self.tint {
            for (c, t) in rgb.iter_mut().zip(tint) {
                *c = ((*c as u32 * t as u32) / 255) as u8;
            }
        }
        if self.light != 0 {
            for c in rgb.iter_mut() {
                *c = (*c as i32 + self.light).clamp(0, 255) as u8;
            }
        }
        rgb
    }
}

/// One entry in the object layer: a source surface plus the transform and
/// filter state the scenario has configured for it.
#[derive(Clone)]
pub struct GraphicsObject {
    pub surface: Rc<Surface>,
    pub pattern_no: usize,
    pub position: Point,
    /// Percentage scale per axis; 100 is unscaled.
    pub scale_x: i32,
    pub scale_y: i32,
    /// Stored for the scenario to read back; rotation is not rasterised.
    pub rotation: i32,
    pub filters: ObjectFilters,
    pub alpha: u8,
    pub clip: Option<Rect>,
    pub composite: CompositeMode,
    pub visible: bool,
}

impl GraphicsObject {
    /// Constructor with the neutral transform: pattern 0, unscaled, opaque.
    pub fn new(surface: Rc<Surface>) -> Self {
        GraphicsObject {
            surface,
            pattern_no: 0,
            position: Point::default(),
            scale_x: 100,
            scale_y: 100,
            rotation: 0,
            filters: ObjectFilters::default(),
            alpha: 255,
            clip: None,
            composite: CompositeMode::Normal,
            visible: true,
        }
    }

    /// Draws this object onto `dst`.
    fn render(&self, dst: &mut Surface) {
        if !self.visible || self.alpha == 0 {
            return;
        }
        let region = self.surface.pattern(self.pattern_no);
        let scaled = Size::new(
            region.rect.width * self.scale_x / 100,
            region.rect.height * self.scale_y / 100,
        );
        let dst_rect = Rect::rec(
            self.position.x - region.anchor.x,
            self.position.y - region.anchor.y,
            scaled.width,
            scaled.height,
        );

        if self.filters == ObjectFilters::default()
            && self.clip.is_none()
            && self.composite == CompositeMode::Normal
        {
            self.surface
                .blit_to(dst, region.rect, dst_rect, Opacity::Uniform(self.alpha));
            return;
        }

        // Filtered path: run the source through the filters into a scratch
        // surface, then clip and blend that.
        let mut filtered = Surface::new(region.rect.width, region.rect.height);
        for y in 0..region.rect.height {
            for x in 0..region.rect.width {
                let src = self.surface.pixel(region.rect.x + x, region.rect.y + y);
                let rgb = self.filters.apply([src[0], src[1], src[2]]);
                filtered
                    .pixels
                    .put_pixel(x as u32, y as u32, Rgba([rgb[0], rgb[1], rgb[2], src[3]]));
            }
        }
        let draw = |filtered: &Surface, dst: &mut Surface, src: Rect, at: Rect| match self.composite
        {
            CompositeMode::Normal => {
                filtered.blit_to(dst, src, at, Opacity::Uniform(self.alpha))
            }
            CompositeMode::Additive => filtered.blit_to_additive(dst, src, at, self.alpha),
        };
        match self.clip {
            Some(clip) => {
                if let Some(visible) = dst_rect.intersect(&clip) {
                    // Map the clipped destination back into source space.
                    let sx = region.rect.width as f32 / dst_rect.width as f32;
                    let sy = region.rect.height as f32 / dst_rect.height as f32;
                    let src = Rect::rec(
                        ((visible.x - dst_rect.x) as f32 * sx) as i32,
                        ((visible.y - dst_rect.y) as f32 * sy) as i32,
                        (visible.width as f32 * sx) as i32,
                        (visible.height as f32 * sy) as i32,
                    );
                    draw(&filtered, dst, src, visible);
                }
            }
            None => draw(&filtered, dst, filtered.rect(), dst_rect),
        }
    }
}

/// How the end of a bytecode-driven drawing operation refreshes the screen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScreenUpdateMode {
    /// The machine refreshes whenever something marked the screen dirty.
    Automatic,
    /// The scenario refreshes explicitly.
    Manual,
}

/// The display-context set, object layer and composited output buffer.
pub struct GraphicsSystem {
    screen_size: Size,
    dcs: Vec<Surface>,
    screen: Surface,
    objects: BTreeMap<usize, GraphicsObject>,
    dirty: bool,
    responsible_for_update: bool,
    interface_hidden: bool,
    update_mode: ScreenUpdateMode,
    frames_presented: u64,
}

impl GraphicsSystem {
    /// Constructor allocating DC0 and DC1 at the screen size; the remaining
    /// contexts start as 1x1 placeholders until the scenario allocates them.
    pub fn new(screen_size: Size) -> Self {
        let mut dcs = Vec::with_capacity(DC_COUNT);
        for i in 0..DC_COUNT {
            if i == DC_SCREEN || i == DC_STAGING {
                dcs.push(Surface::new(screen_size.width, screen_size.height));
            } else {
                dcs.push(Surface::new(1, 1));
            }
        }
        GraphicsSystem {
            screen_size,
            dcs,
            screen: Surface::new(screen_size.width, screen_size.height),
            objects: BTreeMap::new(),
            dirty: true,
            responsible_for_update: true,
            interface_hidden: false,
            update_mode: ScreenUpdateMode::Automatic,
            frames_presented: 0,
        }
    }

    pub fn screen_size(&self) -> Size {
        self.screen_size
    }

    pub fn screen_rect(&self) -> Rect {
        Rect::rec(0, 0, self.screen_size.width, self.screen_size.height)
    }

    pub fn dc(&self, index: usize) -> &Surface {
        &self.dcs[index]
    }

    pub fn dc_mut(&mut self, index: usize) -> &mut Surface {
        &mut self.dcs[index]
    }

    /// Reallocates a display context at a new size, clearing it.
    pub fn allocate_dc(&mut self, index: usize, size: Size) {
        self.dcs[index] = Surface::new(size.width, size.height);
    }

    /// Copies one display context onto another at full opacity.
    pub fn copy_dc(&mut self, from: usize, to: usize) {
        let src = self.dcs[from].clone();
        let dst_rect = src.rect();
        src.blit_to(&mut self.dcs[to], src.rect(), dst_rect, Opacity::Uniform(255));
        self.dirty = true;
    }

    /// Starts an explicitly drawn frame (an effect's frame): the output
    /// buffer is cleared to black.
    pub fn begin_frame(&mut self) {
        self.screen.fill(0, 0, 0, 255);
    }

    /// Draws part of a display context into the output buffer.  This is the
    /// primitive the transition effects are written in.
    pub fn render_dc_to_screen(
        &mut self,
        dc: usize,
        src_rect: Rect,
        dst_rect: Rect,
        opacity: Opacity,
    ) {
        let src = self.dcs[dc].clone();
        src.blit_to(&mut self.screen, src_rect, dst_rect, opacity);
    }

    /// Draws an arbitrary surface into the output buffer (used by zooms,
    /// which render from captured surfaces rather than the DC set).
    pub fn render_surface_to_screen(
        &mut self,
        surface: &Surface,
        src_rect: Rect,
        dst_rect: Rect,
        opacity: Opacity,
    ) {
        surface.blit_to(&mut self.screen, src_rect, dst_rect, opacity);
    }

    /// Finishes an explicitly drawn frame.
    pub fn end_frame(&mut self) {
        self.frames_presented += 1;
        self.dirty = false;
    }

    /// Composites the steady-state frame: DC0, then the object layer in
    /// index order.  Text overlays are drawn on top by the caller before
    /// [GraphicsSystem::end_frame].
    pub fn render_background_and_objects(&mut self) {
        let dc0 = self.dcs[DC_SCREEN].clone();
        let dst_rect = self.screen_rect();
        dc0.blit_to(&mut self.screen, dc0.rect(), dst_rect, Opacity::Uniform(255));
        let objects: Vec<GraphicsObject> = self.objects.values().cloned().collect();
        for object in objects {
            object.render(&mut self.screen);
        }
    }

    /// The composited output, for the host to upload as a texture.
    pub fn screen(&self) -> &Surface {
        &self.screen
    }

    /// Direct access for text overlay rendering.
    pub fn screen_mut(&mut self) -> &mut Surface {
        &mut self.screen
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Flags that the next steady-state pass must redraw.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Forces a redraw regardless of update mode.
    pub fn force_refresh(&mut self) {
        self.dirty = true;
    }

    /// Whether the machine's end-of-frame refresh pass should run.
    pub fn refresh_needed(&self) -> bool {
        self.dirty && self.responsible_for_update && self.update_mode == ScreenUpdateMode::Automatic
    }

    /// While an effect runs it takes over frame drawing; the machine's own
    /// refresh pass stands down until this is restored.
    pub fn set_responsible_for_update(&mut self, responsible: bool) {
        self.responsible_for_update = responsible;
    }

    pub fn is_responsible_for_update(&self) -> bool {
        self.responsible_for_update
    }

    pub fn set_screen_update_mode(&mut self, mode: ScreenUpdateMode) {
        self.update_mode = mode;
    }

    pub fn screen_update_mode(&self) -> ScreenUpdateMode {
        self.update_mode
    }

    pub fn toggle_interface_hidden(&mut self) {
        self.interface_hidden = !self.interface_hidden;
        self.dirty = true;
    }

    pub fn interface_hidden(&self) -> bool {
        self.interface_hidden
    }

    /// Installs or replaces the object at `index`.
    pub fn set_object(&mut self, index: usize, object: GraphicsObject) {
        self.objects.insert(index, object);
        self.dirty = true;
    }

    pub fn object_mut(&mut self, index: usize) -> Option<&mut GraphicsObject> {
        self.dirty = true;
        self.objects.get_mut(&index)
    }

    pub fn free_object(&mut self, index: usize) {
        self.objects.remove(&index);
        self.dirty = true;
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_checker_surface() -> Surface {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(Rect::rec(0, 0, 2, 4), 255, 0, 0, 255);
        surface.fill_rect(Rect::rec(2, 0, 2, 4), 0, 0, 255, 255);
        surface
    }

    #[test]
    fn test_rect_conversions_agree() {
        assert_eq!(Rect::grp(10, 20, 30, 50), Rect::rec(10, 20, 20, 30));
    }

    #[test]
    fn test_intersect_clips_and_rejects() {
        let a = Rect::rec(0, 0, 10, 10);
        let b = Rect::rec(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::rec(5, 5, 5, 5)));
        let c = Rect::rec(20, 20, 5, 5);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_blit_copies_pixels_at_full_opacity() {
        let src = setup_checker_surface();
        let mut dst = Surface::new(4, 4);
        src.blit_to(&mut dst, src.rect(), src.rect(), Opacity::Uniform(255));
        assert_eq!(dst.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(dst.pixel(3, 3), [0, 0, 255, 255]);
    }

    #[test]
    fn test_blit_blends_at_half_opacity() {
        let mut src = Surface::new(1, 1);
        src.fill(255, 255, 255, 255);
        let mut dst = Surface::new(1, 1);
        dst.fill(0, 0, 0, 255);
        let dst_rect = dst.rect();
        src.blit_to(&mut dst, src.rect(), dst_rect, Opacity::Uniform(128));
        let pixel = dst.pixel(0, 0);
        assert!(pixel[0] > 120 && pixel[0] < 136);
    }

    #[test]
    fn test_blit_scales_nearest_neighbour() {
        let src = setup_checker_surface();
        let mut dst = Surface::new(8, 8);
        src.blit_to(
            &mut dst,
            src.rect(),
            Rect::rec(0, 0, 8, 8),
            Opacity::Uniform(255),
        );
        // Left half red, right half blue, at doubled size.
        assert_eq!(dst.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(dst.pixel(7, 7), [0, 0, 255, 255]);
    }

    #[test]
    fn test_corner_opacity_gradient_runs_top_to_bottom() {
        let mut src = Surface::new(1, 16);
        src.fill(255, 255, 255, 255);
        let mut dst = Surface::new(1, 16);
        dst.fill(0, 0, 0, 255);
        let dst_rect = dst.rect();
        src.blit_to(
            &mut dst,
            src.rect(),
            dst_rect,
            Opacity::Corners([255, 255, 0, 0]),
        );
        // Opaque at the top edge, fading towards transparent at the bottom.
        assert!(dst.pixel(0, 0)[0] > 240);
        assert!(dst.pixel(0, 8)[0] < 160);
        assert!(dst.pixel(0, 15)[0] < 32);
    }

    #[test]
    fn test_pattern_lookup_falls_back_to_whole_surface() {
        let mut surface = setup_checker_surface();
        assert_eq!(surface.pattern(0).rect, Rect::rec(0, 0, 4, 4));
        surface.set_regions(vec![SurfaceRegion {
            rect: Rect::rec(2, 0, 2, 4),
            anchor: Point::new(1, 1),
        }]);
        assert_eq!(surface.pattern(0).rect, Rect::rec(2, 0, 2, 4));
        assert_eq!(surface.pattern(0).anchor, Point::new(1, 1));
    }

    #[test]
    fn test_object_layer_composites_in_index_order() {
        let mut graphics = GraphicsSystem::new(Size::new(4, 4));
        let mut red = Surface::new(4, 4);
        red.fill(255, 0, 0, 255);
        let mut blue = Surface::new(4, 4);
        blue.fill(0, 0, 255, 255);
        // Insert out of order; index 9 must still draw on top of index 2.
        graphics.set_object(9, GraphicsObject::new(Rc::new(blue)));
        graphics.set_object(2, GraphicsObject::new(Rc::new(red)));

        graphics.begin_frame();
        graphics.render_background_and_objects();
        graphics.end_frame();
        assert_eq!(graphics.screen().pixel(0, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn test_invisible_object_is_skipped() {
        let mut graphics = GraphicsSystem::new(Size::new(4, 4));
        let mut red = Surface::new(4, 4);
        red.fill(255, 0, 0, 255);
        let mut object = GraphicsObject::new(Rc::new(red));
        object.visible = false;
        graphics.set_object(0, object);

        graphics.begin_frame();
        graphics.render_background_and_objects();
        graphics.end_frame();
        assert_eq!(graphics.screen().pixel(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_object_filters_invert_and_clip() {
        let mut white = Surface::new(4, 4);
        white.fill(255, 255, 255, 255);
        let mut object = GraphicsObject::new(Rc::new(white));
        object.filters.invert = 1;
        object.clip = Some(Rect::rec(0, 0, 2, 4));

        let mut graphics = GraphicsSystem::new(Size::new(4, 4));
        graphics.dc_mut(DC_SCREEN).fill(0, 255, 0, 255);
        graphics.set_object(0, object);
        graphics.begin_frame();
        graphics.render_background_and_objects();
        graphics.end_frame();
        // Inside the clip the inverted (black) object covers the background.
        assert_eq!(graphics.screen().pixel(0, 0), [0, 0, 0, 255]);
        // Outside the clip the DC0 background shows through.
        assert_eq!(graphics.screen().pixel(3, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn test_additive_composite_saturates() {
        let mut dim = Surface::new(2, 2);
        dim.fill(100, 200, 0, 255);
        let mut object = GraphicsObject::new(Rc::new(dim));
        object.composite = CompositeMode::Additive;

        let mut graphics = GraphicsSystem::new(Size::new(2, 2));
        graphics.dc_mut(DC_SCREEN).fill(100, 100, 100, 255);
        graphics.set_object(0, object);
        graphics.begin_frame();
        graphics.render_background_and_objects();
        graphics.end_frame();
        // 100+100, 100+200 saturated, 100+0.
        assert_eq!(graphics.screen().pixel(0, 0), [200, 255, 100, 255]);
    }

    #[test]
    fn test_refresh_needed_respects_responsibility_and_mode() {
        let mut graphics = GraphicsSystem::new(Size::new(4, 4));
        graphics.mark_dirty();
        assert!(graphics.refresh_needed());
        graphics.set_responsible_for_update(false);
        assert!(!graphics.refresh_needed());
        graphics.set_responsible_for_update(true);
        graphics.set_screen_update_mode(ScreenUpdateMode::Manual);
        assert!(!graphics.refresh_needed());
    }

    #[test]
    fn test_copy_dc_duplicates_staging_onto_screen_context() {
        let mut graphics = GraphicsSystem::new(Size::new(2, 2));
        graphics.dc_mut(DC_STAGING).fill(9, 9, 9, 255);
        graphics.copy_dc(DC_STAGING, DC_SCREEN);
        assert_eq!(graphics.dc(DC_SCREEN).pixel(1, 1), [9, 9, 9, 255]);
    }
}
