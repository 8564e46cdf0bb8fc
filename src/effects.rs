use crate::error::ErrorDetail;
use crate::graphics::{
    GraphicsSystem, Opacity, Rect, Size, Surface, DC_SCREEN, DC_STAGING,
};
use crate::longop::{decorate_effect_with_blit, LongOperation};
use crate::machine::Machine;
use std::rc::Rc;

/// The axis and direction a wipe or scroll moves in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    TopToBottom,
    BottomToTop,
    LeftToRight,
    RightToLeft,
}

impl Direction {
    fn from_sel(direction: i32) -> Direction {
        match direction {
            0 => Direction::TopToBottom,
            1 => Direction::BottomToTop,
            2 => Direction::LeftToRight,
            _ => Direction::RightToLeft,
        }
    }

    /// The screen extent along the swept axis.
    fn axis_size(self, size: Size) -> i32 {
        match self {
            Direction::TopToBottom | Direction::BottomToTop => size.height,
            Direction::LeftToRight | Direction::RightToLeft => size.width,
        }
    }
}

/// Which pair of primitive blits a scroll-squash-slide transition composes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Composition {
    ScrollOnScrollOff,
    ScrollOnSquashOff,
    SquashOnScrollOff,
    SquashOnSquashOff,
    SlideOn,
    SlideOff,
}

/// The closed family of transition compositors.
pub enum EffectKind {
    /// A hard boundary (optionally softened by a gradient strip) sweeps the
    /// incoming staging context across the axis.
    Wipe {
        direction: Direction,
        interpolation_pixels: i32,
    },
    /// Directional scroll/squash of the outgoing and incoming contexts.
    ScrollSquashSlide {
        direction: Direction,
        composition: Composition,
    },
    /// A source rectangle interpolates between two rectangles of a captured
    /// surface, drawn into a fixed destination over a captured background.
    Zoom {
        orig: Rc<Surface>,
        src: Rc<Surface>,
        from_rect: Rect,
        to_rect: Rect,
        dest_rect: Rect,
    },
}

/// A transition effect: a [LongOperation] that drives its own frames,
/// deterministically parameterised by elapsed time.
///
/// While an effect lives, it owns screen refresh (the machine's steady-state
/// pass stands down); responsibility is restored on the step that reports
/// completion.  Effects hold a realtime task so the host pacer never sleeps
/// mid-transition.
pub struct Effect {
    screen_size: Size,
    duration_ms: u32,
    start_time_ms: u32,
    kind: EffectKind,
    finished: bool,
}

impl Effect {
    /// Constructor.  Captures the start tick and takes over screen updates.
    pub fn new(machine: &mut Machine, kind: EffectKind, size: Size, duration_ms: u32) -> Self {
        machine.system.graphics.set_responsible_for_update(false);
        machine.system.event.begin_realtime_task();
        Effect {
            screen_size: size,
            duration_ms,
            start_time_ms: machine.system.event.ticks(),
            kind,
            finished: false,
        }
    }

    /// Whether the incoming frame starts from the untouched screen context.
    fn blit_original_image(&self) -> bool {
        matches!(self.kind, EffectKind::Wipe { .. })
    }

    fn finish(&mut self, machine: &mut Machine) {
        if !self.finished {
            self.finished = true;
            machine.system.graphics.set_responsible_for_update(true);
            machine.system.event.end_realtime_task();
        }
    }

    /// Draws the effect's state for elapsed time `t`.
    fn perform_effect_for_time(&self, graphics: &mut GraphicsSystem, t: u32) {
        match &self.kind {
            EffectKind::Wipe {
                direction,
                interpolation_pixels,
            } => {
                let axis = direction.axis_size(self.screen_size);
                let (interpolation, main) = calculate_wipe_sizes(
                    t,
                    self.duration_ms,
                    *interpolation_pixels,
                    axis,
                );
                draw_wipe(graphics, self.screen_size, *direction, main, interpolation);
            }
            EffectKind::ScrollSquashSlide {
                direction,
                composition,
            } => {
                let axis = direction.axis_size(self.screen_size);
                let amount = amount_visible(t, self.duration_ms, axis);
                draw_scroll_squash_slide(
                    graphics,
                    self.screen_size,
                    *direction,
                    *composition,
                    amount,
                );
            }
            EffectKind::Zoom {
                orig,
                src,
                from_rect,
                to_rect,
                dest_rect,
            } => {
                let full = Rect::rec(0, 0, self.screen_size.width, self.screen_size.height);
                graphics.render_surface_to_screen(orig, orig.rect(), full, Opacity::Uniform(255));
                let zoomed = zoom_rect(*from_rect, *to_rect, t, self.duration_ms);
                graphics.render_surface_to_screen(src, zoomed, *dest_rect, Opacity::Uniform(255));
            }
        }
    }
}

impl LongOperation for Effect {
    fn step(&mut self, machine: &mut Machine) -> Result<bool, ErrorDetail> {
        let now = machine.system.event.ticks();
        let t = now.wrapping_sub(self.start_time_ms);

        if t >= self.duration_ms
            || machine.system.event.ctrl_pressed()
            || machine.fast_forward()
        {
            self.finish(machine);
            return Ok(true);
        }

        let graphics = &mut machine.system.graphics;
        graphics.begin_frame();
        if self.blit_original_image() {
            let full = Rect::rec(0, 0, self.screen_size.width, self.screen_size.height);
            graphics.render_dc_to_screen(DC_SCREEN, full, full, Opacity::Uniform(255));
        }
        self.perform_effect_for_time(graphics, t);
        graphics.end_frame();
        Ok(false)
    }
}

/// The swept distance for elapsed fraction `t / duration` over an axis
/// extended by the interpolation width, split into the gradient strip size
/// and the solid region size.
fn calculate_wipe_sizes(
    t: u32,
    duration_ms: u32,
    interpolation_pixels: i32,
    axis_size: i32,
) -> (i32, i32) {
    let swept =
        ((t as f32 / duration_ms as f32) * (axis_size + interpolation_pixels) as f32) as i32;
    if swept < interpolation_pixels {
        (swept, 0)
    } else if swept < axis_size {
        (interpolation_pixels, swept - interpolation_pixels)
    } else if swept < axis_size + interpolation_pixels {
        let main = swept - interpolation_pixels;
        (axis_size - main, main)
    } else {
        (0, axis_size)
    }
}

/// `⌊p · axis_size⌋` for the scroll family.
fn amount_visible(t: u32, duration_ms: u32, axis_size: i32) -> i32 {
    ((t as f32 / duration_ms as f32) * axis_size as f32) as i32
}

/// The interpolated source rectangle of a zoom at elapsed time `t`.
fn zoom_rect(from_rect: Rect, to_rect: Rect, t: u32, duration_ms: u32) -> Rect {
    let ratio = t as f32 / duration_ms as f32;
    let lerp = |a: i32, b: i32| a + ((b - a) as f32 * ratio) as i32;
    Rect::rec(
        lerp(from_rect.x, to_rect.x),
        lerp(from_rect.y, to_rect.y),
        lerp(from_rect.width, to_rect.width),
        lerp(from_rect.height, to_rect.height),
    )
}

fn draw_wipe(
    graphics: &mut GraphicsSystem,
    size: Size,
    direction: Direction,
    main: i32,
    interpolation: i32,
) {
    let (w, h) = (size.width, size.height);
    match direction {
        Direction::TopToBottom => {
            if main > 0 {
                let rect = Rect::rec(0, 0, w, main);
                graphics.render_dc_to_screen(DC_STAGING, rect, rect, Opacity::Uniform(255));
            }
            if interpolation > 0 {
                let rect = Rect::rec(0, main, w, interpolation);
                graphics.render_dc_to_screen(
                    DC_STAGING,
                    rect,
                    rect,
                    Opacity::Corners([255, 255, 0, 0]),
                );
            }
        }
        Direction::BottomToTop => {
            if main > 0 {
                let rect = Rect::rec(0, h - main, w, main);
                graphics.render_dc_to_screen(DC_STAGING, rect, rect, Opacity::Uniform(255));
            }
            if interpolation > 0 {
                let rect = Rect::rec(0, h - main - interpolation, w, interpolation);
                graphics.render_dc_to_screen(
                    DC_STAGING,
                    rect,
                    rect,
                    Opacity::Corners([0, 0, 255, 255]),
                );
            }
        }
        Direction::LeftToRight => {
            if main > 0 {
                let rect = Rect::rec(0, 0, main, h);
                graphics.render_dc_to_screen(DC_STAGING, rect, rect, Opacity::Uniform(255));
            }
            if interpolation > 0 {
                let rect = Rect::rec(main, 0, interpolation, h);
                graphics.render_dc_to_screen(
                    DC_STAGING,
                    rect,
                    rect,
                    Opacity::Corners([255, 0, 0, 255]),
                );
            }
        }
        Direction::RightToLeft => {
            if main > 0 {
                let rect = Rect::rec(w - main, 0, main, h);
                graphics.render_dc_to_screen(DC_STAGING, rect, rect, Opacity::Uniform(255));
            }
            if interpolation > 0 {
                let rect = Rect::rec(w - main - interpolation, 0, interpolation, h);
                graphics.render_dc_to_screen(
                    DC_STAGING,
                    rect,
                    rect,
                    Opacity::Corners([0, 255, 255, 0]),
                );
            }
        }
    }
}

/// The four primitive blits the scroll family is composed from, each
/// parameterised by the visible amount along the axis.
fn scroll_on(graphics: &mut GraphicsSystem, size: Size, direction: Direction, amount: i32) {
    let (w, h) = (size.width, size.height);
    let (src, dst) = match direction {
        Direction::TopToBottom => (Rect::rec(0, h - amount, w, amount), Rect::rec(0, 0, w, amount)),
        Direction::BottomToTop => (Rect::rec(0, 0, w, amount), Rect::rec(0, h - amount, w, amount)),
        Direction::LeftToRight => (Rect::rec(w - amount, 0, amount, h), Rect::rec(0, 0, amount, h)),
        Direction::RightToLeft => (Rect::rec(0, 0, amount, h), Rect::rec(w - amount, 0, amount, h)),
    };
    graphics.render_dc_to_screen(DC_STAGING, src, dst, Opacity::Uniform(255));
}

fn scroll_off(graphics: &mut GraphicsSystem, size: Size, direction: Direction, amount: i32) {
    let (w, h) = (size.width, size.height);
    let (src, dst) = match direction {
        Direction::TopToBottom => (Rect::rec(0, 0, w, h - amount), Rect::rec(0, amount, w, h - amount)),
        Direction::BottomToTop => (Rect::rec(0, amount, w, h - amount), Rect::rec(0, 0, w, h - amount)),
        Direction::LeftToRight => (Rect::rec(0, 0, w - amount, h), Rect::rec(amount, 0, w - amount, h)),
        Direction::RightToLeft => (Rect::rec(amount, 0, w - amount, h), Rect::rec(0, 0, w - amount, h)),
    };
    graphics.render_dc_to_screen(DC_SCREEN, src, dst, Opacity::Uniform(255));
}

fn squash_on(graphics: &mut GraphicsSystem, size: Size, direction: Direction, amount: i32) {
    let (w, h) = (size.width, size.height);
    let full = Rect::rec(0, 0, w, h);
    let dst = match direction {
        Direction::TopToBottom => Rect::rec(0, 0, w, amount),
        Direction::BottomToTop => Rect::rec(0, h - amount, w, amount),
        Direction::LeftToRight => Rect::rec(0, 0, amount, h),
        Direction::RightToLeft => Rect::rec(w - amount, 0, amount, h),
    };
    graphics.render_dc_to_screen(DC_STAGING, full, dst, Opacity::Uniform(255));
}

fn squash_off(graphics: &mut GraphicsSystem, size: Size, direction: Direction, amount: i32) {
    let (w, h) = (size.width, size.height);
    let full = Rect::rec(0, 0, w, h);
    let dst = match direction {
        Direction::TopToBottom => Rect::rec(0, amount, w, h - amount),
        Direction::BottomToTop => Rect::rec(0, 0, w, h - amount),
        Direction::LeftToRight => Rect::rec(amount, 0, w - amount, h),
        Direction::RightToLeft => Rect::rec(0, 0, w - amount, h),
    };
    graphics.render_dc_to_screen(DC_SCREEN, full, dst, Opacity::Uniform(255));
}

fn draw_scroll_squash_slide(
    graphics: &mut GraphicsSystem,
    size: Size,
    direction: Direction,
    composition: Composition,
    amount: i32,
) {
    let full = Rect::rec(0, 0, size.width, size.height);
    match composition {
        Composition::ScrollOnScrollOff => {
            scroll_on(graphics, size, direction, amount);
            scroll_off(graphics, size, direction, amount);
        }
        Composition::ScrollOnSquashOff => {
            scroll_on(graphics, size, direction, amount);
            squash_off(graphics, size, direction, amount);
        }
        Composition::SquashOnScrollOff => {
            squash_on(graphics, size, direction, amount);
            scroll_off(graphics, size, direction, amount);
        }
        Composition::SquashOnSquashOff => {
            squash_on(graphics, size, direction, amount);
            squash_off(graphics, size, direction, amount);
        }
        Composition::SlideOn => {
            graphics.render_dc_to_screen(DC_SCREEN, full, full, Opacity::Uniform(255));
            scroll_on(graphics, size, direction, amount);
        }
        Composition::SlideOff => {
            graphics.render_dc_to_screen(DC_STAGING, full, full, Opacity::Uniform(255));
            scroll_off(graphics, size, direction, amount);
        }
    }
}

/// The wipe's soft-edge width for interpolation level `n`.
fn interpolation_pixels(n: i32) -> i32 {
    if n > 0 {
        (2.5 * (2f32).powi(n)) as i32
    } else {
        0
    }
}

/// Builds the effect a 17-int #SEL/#SELR descriptor describes, wrapped in
/// the final-blit decorator that establishes the post-transition state.
///
/// Styles outside the implemented families warn and fall back to an instant
/// transition.
pub fn effect_from_sel_values(
    machine: &mut Machine,
    values: &[i32],
    sel_no: i32,
) -> Result<Box<dyn LongOperation>, ErrorDetail> {
    if values.len() < 16 {
        return Err(ErrorDetail::MalformedScenario {
            reason: format!("#SEL.{:03} has {} values, wanted 17", sel_no, values.len()),
        });
    }
    let duration = values[6].max(0) as u32;
    let style = values[7];
    let direction = Direction::from_sel(values[8]);
    let interpolation = values[9];
    build_effect(machine, duration, style, direction, interpolation)
}

/// Looks up `#SEL.<n>` (grp-style source coordinates) and builds its effect.
pub fn effect_from_sel(
    machine: &mut Machine,
    sel_no: i32,
) -> Result<Box<dyn LongOperation>, ErrorDetail> {
    let key = crate::gameexe::Gameexe::key_with_index("SEL", sel_no, "");
    let values = machine
        .system
        .gameexe
        .int_vector(&key)
        .ok_or(ErrorDetail::MalformedScenario {
            reason: format!("no #SEL entry {:03}", sel_no),
        })?;
    effect_from_sel_values(machine, &values, sel_no)
}

/// Looks up `#SELR.<n>` (rec-style source coordinates) and builds its effect.
pub fn effect_from_selr(
    machine: &mut Machine,
    sel_no: i32,
) -> Result<Box<dyn LongOperation>, ErrorDetail> {
    let key = crate::gameexe::Gameexe::key_with_index("SELR", sel_no, "");
    let values = machine
        .system
        .gameexe
        .int_vector(&key)
        .ok_or(ErrorDetail::MalformedScenario {
            reason: format!("no #SELR entry {:03}", sel_no),
        })?;
    effect_from_sel_values(machine, &values, sel_no)
}

/// Builds and decorates an effect from its resolved parameters.
pub fn build_effect(
    machine: &mut Machine,
    duration_ms: u32,
    style: i32,
    direction: Direction,
    interpolation: i32,
) -> Result<Box<dyn LongOperation>, ErrorDetail> {
    let size = machine.system.graphics.screen_size();
    let screen_rect = machine.system.graphics.screen_rect();
    let kind = match style {
        10 => EffectKind::Wipe {
            direction,
            interpolation_pixels: interpolation_pixels(interpolation),
        },
        15 => EffectKind::ScrollSquashSlide {
            direction,
            composition: Composition::ScrollOnScrollOff,
        },
        16 => EffectKind::ScrollSquashSlide {
            direction,
            composition: Composition::ScrollOnSquashOff,
        },
        17 => EffectKind::ScrollSquashSlide {
            direction,
            composition: Composition::SquashOnScrollOff,
        },
        18 => EffectKind::ScrollSquashSlide {
            direction,
            composition: Composition::SquashOnSquashOff,
        },
        20 => EffectKind::ScrollSquashSlide {
            direction,
            composition: Composition::SlideOn,
        },
        21 => EffectKind::ScrollSquashSlide {
            direction,
            composition: Composition::SlideOff,
        },
        other => {
            log::warn!("transition style {} not implemented, cutting instantly", other);
            let effect = Effect::new(
                machine,
                EffectKind::Wipe {
                    direction,
                    interpolation_pixels: 0,
                },
                size,
                0,
            );
            return Ok(decorate_effect_with_blit(Box::new(effect), screen_rect));
        }
    };
    let effect = Effect::new(machine, kind, size, duration_ms);
    Ok(decorate_effect_with_blit(Box::new(effect), screen_rect))
}

/// Builds a zoom over captured surfaces, wrapped in the final blit.
pub fn build_zoom(
    machine: &mut Machine,
    orig: Rc<Surface>,
    src: Rc<Surface>,
    from_rect: Rect,
    to_rect: Rect,
    dest_rect: Rect,
    duration_ms: u32,
) -> Box<dyn LongOperation> {
    let size = machine.system.graphics.screen_size();
    let screen_rect = machine.system.graphics.screen_rect();
    let effect = Effect::new(
        machine,
        EffectKind::Zoom {
            orig,
            src,
            from_rect,
            to_rect,
            dest_rect,
        },
        size,
        duration_ms,
    );
    decorate_effect_with_blit(Box::new(effect), screen_rect)
}
