use crate::assets::IMAGE_FILETYPES;
use crate::counter::{CounterKind, FrameCounter};
use crate::effects;
use crate::error::ErrorDetail;
use crate::graphics::{CompositeMode, GraphicsObject, Rect, Surface};
use crate::instruction::{ParamSpec, Value};
use crate::longop::WaitLongOperation;
use crate::machine::Machine;
use crate::pause::{new_paragraph_after, PauseLongOperation};
use crate::registry::{OpOutcome, OpcodeRegistry};
use std::rc::Rc;

/// RealLive module numbers, as the bytecode partitions them.
pub const MODULE_JMP: u8 = 1;
pub const MODULE_MSG: u8 = 3;
pub const MODULE_SYS: u8 = 4;
pub const MODULE_MEM: u8 = 11;
pub const MODULE_BGM: u8 = 20;
pub const MODULE_PCM: u8 = 21;
pub const MODULE_SE: u8 = 22;
pub const MODULE_KOE: u8 = 23;
pub const MODULE_GRP: u8 = 33;
pub const MODULE_OBJ: u8 = 61;

/// Builds the registry every machine starts with.
pub fn register_default_modules(registry: &mut OpcodeRegistry) {
    register_jmp(registry);
    register_msg(registry);
    register_sys(registry);
    register_mem(registry);
    register_bgm(registry);
    register_pcm(registry);
    register_se(registry);
    register_koe(registry);
    register_grp(registry);
    register_obj(registry);
}

fn arg_int(values: &[Value], index: usize) -> Result<i32, ErrorDetail> {
    values[index].as_int()
}

fn arg_usize(values: &[Value], index: usize) -> Result<usize, ErrorDetail> {
    Ok(arg_int(values, index)?.max(0) as usize)
}

fn arg_rect(values: &[Value], index: usize) -> Result<Rect, ErrorDetail> {
    match &values[index] {
        Value::Complex(parts) if parts.len() == 4 => Ok(Rect::rec(
            parts[0].as_int()?,
            parts[1].as_int()?,
            parts[2].as_int()?,
            parts[3].as_int()?,
        )),
        other => Err(ErrorDetail::BadOpcodeArguments {
            name: "<rect>".to_string(),
            reason: format!("expected (x, y, w, h) complex, got {:?}", other),
        }),
    }
}

fn check_dc(dc: usize) -> Result<(), ErrorDetail> {
    if dc >= 16 {
        return Err(ErrorDetail::BadOpcodeArguments {
            name: "<dc>".to_string(),
            reason: format!("display context {} out of range", dc),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------- [ Jmp ]

fn register_jmp(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_JMP,
        0,
        0,
        "goto",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let scene = machine.position().scene;
            machine.jump(scene, arg_usize(values, 0)?)?;
            Ok(OpOutcome::Jumped)
        }),
    );
    registry.register(
        MODULE_JMP,
        1,
        0,
        "goto_if",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            if arg_int(values, 0)? != 0 {
                let scene = machine.position().scene;
                machine.jump(scene, arg_usize(values, 1)?)?;
                return Ok(OpOutcome::Jumped);
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_JMP,
        5,
        0,
        "gosub",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.gosub(arg_usize(values, 0)?)?;
            Ok(OpOutcome::Jumped)
        }),
    );
    registry.register(
        MODULE_JMP,
        10,
        0,
        "ret",
        vec![],
        Box::new(|machine, _| {
            machine.return_from_gosub()?;
            Ok(OpOutcome::Jumped)
        }),
    );
    registry.register(
        MODULE_JMP,
        12,
        0,
        "farcall",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.farcall(arg_int(values, 0)?, arg_usize(values, 1)?)?;
            Ok(OpOutcome::Jumped)
        }),
    );
    registry.register(
        MODULE_JMP,
        13,
        0,
        "rtl",
        vec![],
        Box::new(|machine, _| {
            machine.return_from_farcall()?;
            Ok(OpOutcome::Jumped)
        }),
    );
    registry.register(
        MODULE_JMP,
        16,
        0,
        "jump",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.jump(arg_int(values, 0)?, arg_usize(values, 1)?)?;
            Ok(OpOutcome::Jumped)
        }),
    );
}

// ---------------------------------------------------------------- [ Msg ]

fn register_msg(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_MSG,
        3,
        0,
        "par",
        vec![],
        Box::new(|machine, _| {
            let pause = PauseLongOperation::new(machine);
            machine.push_long_operation(new_paragraph_after(Box::new(pause)));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        17,
        0,
        "pause",
        vec![],
        Box::new(|machine, _| {
            let pause = PauseLongOperation::new(machine);
            machine.push_long_operation(Box::new(pause));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        105,
        0,
        "br",
        vec![],
        Box::new(|machine, _| {
            machine.system.text.page_hard_break();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        106,
        0,
        "indent_set",
        vec![],
        Box::new(|machine, _| {
            machine.system.text.page_set_indentation();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        107,
        0,
        "indent_clear",
        vec![],
        Box::new(|machine, _| {
            machine.system.text.page_reset_indentation();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        110,
        0,
        "page",
        vec![],
        Box::new(|machine, _| {
            machine.system.text.snapshot();
            machine.system.text.start_new_page();
            machine.system.graphics.mark_dirty();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        102,
        0,
        "TextWindow",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.system.text.set_active_window(arg_usize(values, 0)?)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        120,
        0,
        "FontColour",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.system.text.page_font_colour(arg_usize(values, 0)?);
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        130,
        0,
        "ruby_begin",
        vec![],
        Box::new(|machine, _| {
            machine.system.text.page_mark_ruby_begin();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MSG,
        131,
        0,
        "ruby_text",
        vec![ParamSpec::StrConstant],
        Box::new(|machine, values| {
            machine.system.text.page_ruby_text(values[0].as_str()?);
            Ok(OpOutcome::Next)
        }),
    );
}

// ---------------------------------------------------------------- [ Sys ]

fn register_sys(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_SYS,
        100,
        0,
        "wait",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let ms = arg_int(values, 0)?.max(0) as u32;
            let now = machine.system.event.ticks();
            let wait = WaitLongOperation::new()
                .wait_until(now + ms)
                .break_on_ctrl();
            machine.push_long_operation(Box::new(wait));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_SYS,
        101,
        0,
        "waitC",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let ms = arg_int(values, 0)?.max(0) as u32;
            let now = machine.system.event.ticks();
            let wait = WaitLongOperation::new()
                .wait_until(now + ms)
                .break_on_clicks()
                .break_on_ctrl();
            machine.push_long_operation(Box::new(wait));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_SYS,
        610,
        0,
        "GetClick",
        vec![ParamSpec::IntReference, ParamSpec::IntReference],
        Box::new(|machine, values| {
            let x = values[0].as_int_ref()?;
            let y = values[1].as_int_ref()?;
            let wait = WaitLongOperation::new().save_click_location(x, y);
            machine.push_long_operation(Box::new(wait));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_SYS,
        202,
        0,
        "ReturnMenu",
        vec![],
        Box::new(|machine, _| {
            machine.return_menu()?;
            Ok(OpOutcome::Jumped)
        }),
    );

    // Timers (layer 0).
    registry.register(
        MODULE_SYS,
        110,
        0,
        "ResetTimer",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine
                .system
                .event
                .set_timer(0, arg_usize(values, 0)?, 0)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_SYS,
        111,
        0,
        "Timer",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let value = machine.system.event.read_timer(0, arg_usize(values, 0)?)?;
            Ok(OpOutcome::Store(value as i32))
        }),
    );

    // Frame counters.
    let kinds = [
        (300u16, "InitFrame", CounterKind::Simple),
        (301, "InitFrameLoop", CounterKind::Loop),
        (302, "InitFrameTurn", CounterKind::Turn),
        (303, "InitFrameAccel", CounterKind::Accelerating),
        (304, "InitFrameDecel", CounterKind::Decelerating),
    ];
    for (opcode, name, kind) in kinds {
        registry.register(
            MODULE_SYS,
            opcode,
            0,
            name,
            vec![
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
            ],
            Box::new(move |machine, values| {
                let counter = arg_usize(values, 0)?;
                let now = machine.system.event.ticks();
                let frame_counter = FrameCounter::new(
                    kind,
                    arg_int(values, 1)?,
                    arg_int(values, 2)?,
                    arg_int(values, 3)?.max(0) as u32,
                    now,
                );
                machine.system.event.set_frame_counter(0, counter, frame_counter)?;
                Ok(OpOutcome::Next)
            }),
        );
    }
    registry.register(
        MODULE_SYS,
        310,
        0,
        "ReadFrame",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let value = machine
                .system
                .event
                .read_frame_counter(0, arg_usize(values, 0)?)?;
            Ok(OpOutcome::Store(value))
        }),
    );
    registry.register(
        MODULE_SYS,
        311,
        0,
        "FrameActive",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let active = machine
                .system
                .event
                .frame_counter_active(0, arg_usize(values, 0)?);
            Ok(OpOutcome::Store(active as i32))
        }),
    );
    registry.register(
        MODULE_SYS,
        320,
        0,
        "InitExFrame",
        vec![
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let counter = arg_usize(values, 0)?;
            let now = machine.system.event.ticks();
            let frame_counter = FrameCounter::new(
                CounterKind::Simple,
                arg_int(values, 1)?,
                arg_int(values, 2)?,
                arg_int(values, 3)?.max(0) as u32,
                now,
            );
            machine.system.event.set_frame_counter(1, counter, frame_counter)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_SYS,
        330,
        0,
        "ReadExFrame",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let value = machine
                .system
                .event
                .read_frame_counter(1, arg_usize(values, 0)?)?;
            Ok(OpOutcome::Store(value))
        }),
    );

    // The original's implementation of this opcode is a known copy-paste of
    // the modulus opcode; until the intended trigonometry is pinned down it
    // stays an explicit no-op.
    registry.register_unsupported(MODULE_SYS, 1132, 0, "Sys_angle");
    registry.register_unsupported(MODULE_SYS, 204, 0, "SetWindowAttr");
}

// ---------------------------------------------------------------- [ Mem ]

fn register_mem(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_MEM,
        0,
        0,
        "setarray",
        vec![
            ParamSpec::IntReference,
            ParamSpec::Argc(Box::new(ParamSpec::IntConstant)),
        ],
        Box::new(|machine, values| {
            let first = values[0].as_int_ref()?;
            for (i, value) in values[1..].iter().enumerate() {
                machine.memory.write_ref(first.offset(i), value.as_int()?)?;
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MEM,
        1,
        0,
        "setrng",
        vec![
            ParamSpec::IntReference,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let first = values[0].as_int_ref()?;
            let count = arg_usize(values, 1)?;
            let value = arg_int(values, 2)?;
            for i in 0..count {
                machine.memory.write_ref(first.offset(i), value)?;
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_MEM,
        10,
        0,
        "cpyvars",
        vec![
            ParamSpec::IntReference,
            ParamSpec::IntReference,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let dst = values[0].as_int_ref()?;
            let src = values[1].as_int_ref()?;
            let count = arg_usize(values, 2)?;
            for i in 0..count {
                let value = machine.memory.read_ref(src.offset(i))?;
                machine.memory.write_ref(dst.offset(i), value)?;
            }
            Ok(OpOutcome::Next)
        }),
    );
}

// ---------------------------------------------------------------- [ Bgm ]

fn register_bgm(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_BGM,
        0,
        0,
        "bgmPlay",
        vec![ParamSpec::StrConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let name = values[0].as_str()?.to_string();
            let looping = arg_int(values, 1)? != 0;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.bgm_play(assets, &name, looping)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_BGM,
        0,
        1,
        "bgmPlay",
        vec![
            ParamSpec::StrConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let name = values[0].as_str()?.to_string();
            let looping = arg_int(values, 1)? != 0;
            let fade_in = arg_int(values, 2)?.max(0) as u32;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.bgm_play_with_fade_in(assets, &name, looping, fade_in)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_BGM,
        0,
        2,
        "bgmPlay",
        vec![
            ParamSpec::StrConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let name = values[0].as_str()?.to_string();
            let looping = arg_int(values, 1)? != 0;
            let fade_in = arg_int(values, 2)?.max(0) as u32;
            let fade_out = arg_int(values, 3)?.max(0) as u32;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.bgm_play_queued(assets, &name, looping, fade_out, fade_in)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_BGM,
        5,
        0,
        "bgmStop",
        vec![],
        Box::new(|machine, _| {
            machine.system.sound.bgm_stop();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_BGM,
        6,
        0,
        "bgmPause",
        vec![],
        Box::new(|machine, _| {
            machine.system.sound.bgm_pause();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_BGM,
        7,
        0,
        "bgmUnPause",
        vec![],
        Box::new(|machine, _| {
            machine.system.sound.bgm_unpause();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_BGM,
        8,
        0,
        "bgmStatus",
        vec![],
        Box::new(|machine, _| Ok(OpOutcome::Store(machine.system.sound.bgm_status()))),
    );
    registry.register(
        MODULE_BGM,
        10,
        0,
        "bgmFadeOut",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine
                .system
                .sound
                .bgm_fade_out(arg_int(values, 0)?.max(0) as u32);
            Ok(OpOutcome::Next)
        }),
    );
}

// ---------------------------------------------------------------- [ Pcm ]

fn register_pcm(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_PCM,
        0,
        0,
        "wavPlay",
        vec![ParamSpec::StrConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let file = values[0].as_str()?.to_string();
            let looping = arg_int(values, 1)? != 0;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.wav_play_auto_channel(assets, &file, looping)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        0,
        1,
        "wavPlay",
        vec![
            ParamSpec::StrConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let file = values[0].as_str()?.to_string();
            let looping = arg_int(values, 1)? != 0;
            let channel = arg_usize(values, 2)?;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.wav_play(assets, &file, looping, channel, 0)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        0,
        2,
        "wavPlay",
        vec![
            ParamSpec::StrConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let file = values[0].as_str()?.to_string();
            let looping = arg_int(values, 1)? != 0;
            let channel = arg_usize(values, 2)?;
            let fade_in = arg_int(values, 3)?.max(0) as u32;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.wav_play(assets, &file, looping, channel, fade_in)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        1,
        0,
        "wavStop",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.system.sound.wav_stop(arg_usize(values, 0)?)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        2,
        0,
        "wavPlaying",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let playing = machine.system.sound.wav_playing(arg_usize(values, 0)?)?;
            Ok(OpOutcome::Store(playing as i32))
        }),
    );
    registry.register(
        MODULE_PCM,
        3,
        0,
        "wavFadeOut",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let channel = arg_usize(values, 0)?;
            let fade_ms = arg_int(values, 1)?.max(0) as u32;
            let now = machine.system.event.ticks();
            machine.system.sound.wav_fade_out(channel, now, fade_ms)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        4,
        0,
        "chanVolume",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine
                .system
                .sound
                .set_channel_volume(arg_usize(values, 0)?, arg_int(values, 1)?)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        4,
        1,
        "chanVolume",
        vec![
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let channel = arg_usize(values, 0)?;
            let volume = arg_int(values, 1)?;
            let fade_ms = arg_int(values, 2)?.max(0) as u32;
            let now = machine.system.event.ticks();
            machine
                .system
                .sound
                .set_channel_volume_with_fade(channel, now, volume, fade_ms)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_PCM,
        5,
        0,
        "wavWait",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let channel = arg_usize(values, 0)?;
            let wait = WaitLongOperation::new().break_on_event(Box::new(move |m: &Machine| {
                !m.system.sound.wav_playing(channel).unwrap_or(false)
            }));
            machine.push_long_operation(Box::new(wait));
            Ok(OpOutcome::Next)
        }),
    );
}

// ----------------------------------------------------------------- [ Se ]

fn register_se(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_SE,
        0,
        0,
        "playSe",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let number = arg_int(values, 0)?;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.play_se(assets, number)?;
            Ok(OpOutcome::Next)
        }),
    );
}

// ---------------------------------------------------------------- [ Koe ]

fn register_koe(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_KOE,
        0,
        0,
        "koePlay",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let id = arg_int(values, 0)?;
            let (sound, assets) = (&mut machine.system.sound, &machine.system.assets);
            sound.koe_play(assets, id)?;
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_KOE,
        1,
        0,
        "koeWait",
        vec![],
        Box::new(|machine, _| {
            let wait = WaitLongOperation::new()
                .break_on_event(Box::new(|m: &Machine| !m.system.sound.koe_playing()))
                .break_on_clicks();
            machine.push_long_operation(Box::new(wait));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_KOE,
        2,
        0,
        "koeStop",
        vec![],
        Box::new(|machine, _| {
            machine.system.sound.koe_stop();
            Ok(OpOutcome::Next)
        }),
    );
}

// ---------------------------------------------------------------- [ Grp ]

fn register_grp(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_GRP,
        1,
        0,
        "recLoad",
        vec![ParamSpec::StrConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let file = values[0].as_str()?.to_string();
            let dc = arg_usize(values, 1)?;
            check_dc(dc)?;
            let path = machine.system.assets.find_file(&file, IMAGE_FILETYPES)?;
            let decoded = image::open(&path)
                .map_err(|_| ErrorDetail::FileError {
                    path: path.display().to_string(),
                })?
                .into_rgba8();
            *machine.system.graphics.dc_mut(dc) = Surface::from_image(decoded);
            machine.system.graphics.mark_dirty();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_GRP,
        2,
        0,
        "recCopy",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let src = arg_usize(values, 0)?;
            let dst = arg_usize(values, 1)?;
            check_dc(src)?;
            check_dc(dst)?;
            machine.system.graphics.copy_dc(src, dst);
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_GRP,
        3,
        0,
        "recFill",
        vec![
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let dc = arg_usize(values, 0)?;
            check_dc(dc)?;
            let (r, g, b) = (
                arg_int(values, 1)?.clamp(0, 255) as u8,
                arg_int(values, 2)?.clamp(0, 255) as u8,
                arg_int(values, 3)?.clamp(0, 255) as u8,
            );
            machine.system.graphics.dc_mut(dc).fill(r, g, b, 255);
            machine.system.graphics.mark_dirty();
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_GRP,
        10,
        0,
        "recEffect",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let effect = effects::effect_from_sel(machine, arg_int(values, 0)?)?;
            machine.push_long_operation(effect);
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_GRP,
        11,
        0,
        "recEffectR",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let effect = effects::effect_from_selr(machine, arg_int(values, 0)?)?;
            machine.push_long_operation(effect);
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_GRP,
        32,
        0,
        "recZoom",
        vec![
            ParamSpec::Complex(vec![
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
            ]),
            ParamSpec::Complex(vec![
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
            ]),
            ParamSpec::Complex(vec![
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
                ParamSpec::IntConstant,
            ]),
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let from_rect = arg_rect(values, 0)?;
            let to_rect = arg_rect(values, 1)?;
            let dest_rect = arg_rect(values, 2)?;
            let duration = arg_int(values, 3)?.max(0) as u32;
            let orig = Rc::new(machine.system.graphics.dc(0).clone());
            let src = Rc::new(machine.system.graphics.dc(1).clone());
            let zoom = effects::build_zoom(
                machine, orig, src, from_rect, to_rect, dest_rect, duration,
            );
            machine.push_long_operation(zoom);
            Ok(OpOutcome::Next)
        }),
    );
}

// ---------------------------------------------------------------- [ Obj ]

fn register_obj(registry: &mut OpcodeRegistry) {
    registry.register(
        MODULE_OBJ,
        0,
        0,
        "objOfFile",
        vec![ParamSpec::IntConstant, ParamSpec::StrConstant],
        Box::new(|machine, values| {
            let object_no = arg_usize(values, 0)?;
            let file = values[1].as_str()?.to_string();
            let path = machine.system.assets.find_file(&file, IMAGE_FILETYPES)?;
            let decoded = image::open(&path)
                .map_err(|_| ErrorDetail::FileError {
                    path: path.display().to_string(),
                })?
                .into_rgba8();
            let surface = Rc::new(Surface::from_image(decoded));
            machine
                .system
                .graphics
                .set_object(object_no, GraphicsObject::new(surface));
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_OBJ,
        1,
        0,
        "objMove",
        vec![
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
            ParamSpec::IntConstant,
        ],
        Box::new(|machine, values| {
            let object_no = arg_usize(values, 0)?;
            let (x, y) = (arg_int(values, 1)?, arg_int(values, 2)?);
            if let Some(object) = machine.system.graphics.object_mut(object_no) {
                object.position = crate::event::Point::new(x, y);
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_OBJ,
        2,
        0,
        "objAlpha",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let object_no = arg_usize(values, 0)?;
            let alpha = arg_int(values, 1)?.clamp(0, 255) as u8;
            if let Some(object) = machine.system.graphics.object_mut(object_no) {
                object.alpha = alpha;
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_OBJ,
        3,
        0,
        "objShow",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let object_no = arg_usize(values, 0)?;
            let visible = arg_int(values, 1)? != 0;
            if let Some(object) = machine.system.graphics.object_mut(object_no) {
                object.visible = visible;
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_OBJ,
        4,
        0,
        "objDelete",
        vec![ParamSpec::IntConstant],
        Box::new(|machine, values| {
            machine.system.graphics.free_object(arg_usize(values, 0)?);
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_OBJ,
        6,
        0,
        "objComposite",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let object_no = arg_usize(values, 0)?;
            let mode = if arg_int(values, 1)? != 0 {
                CompositeMode::Additive
            } else {
                CompositeMode::Normal
            };
            if let Some(object) = machine.system.graphics.object_mut(object_no) {
                object.composite = mode;
            }
            Ok(OpOutcome::Next)
        }),
    );
    registry.register(
        MODULE_OBJ,
        5,
        0,
        "objPattern",
        vec![ParamSpec::IntConstant, ParamSpec::IntConstant],
        Box::new(|machine, values| {
            let object_no = arg_usize(values, 0)?;
            let pattern = arg_usize(values, 1)?;
            if let Some(object) = machine.system.graphics.object_mut(object_no) {
                object.pattern_no = pattern;
            }
            Ok(OpOutcome::Next)
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_the_module_set() {
        let mut registry = OpcodeRegistry::new();
        register_default_modules(&mut registry);
        assert!(registry.entry(MODULE_JMP, 0, 0).is_some());
        assert!(registry.entry(MODULE_MSG, 17, 0).is_some());
        assert!(registry.entry(MODULE_SYS, 100, 0).is_some());
        assert!(registry.entry(MODULE_BGM, 0, 2).is_some());
        assert!(registry.entry(MODULE_PCM, 0, 1).is_some());
        assert!(registry.entry(MODULE_GRP, 10, 0).is_some());
        assert!(registry.entry(MODULE_OBJ, 0, 0).is_some());
    }

    #[test]
    fn test_angle_is_registered_as_unsupported() {
        let mut registry = OpcodeRegistry::new();
        register_default_modules(&mut registry);
        let entry = registry.entry(MODULE_SYS, 1132, 0).unwrap();
        assert_eq!(entry.name, "Sys_angle");
        assert!(entry.handler.is_none());
    }

    #[test]
    fn test_overloads_are_distinct_entries() {
        let mut registry = OpcodeRegistry::new();
        register_default_modules(&mut registry);
        assert_eq!(registry.entry(MODULE_PCM, 0, 0).unwrap().signature.len(), 2);
        assert_eq!(registry.entry(MODULE_PCM, 0, 1).unwrap().signature.len(), 3);
        assert_eq!(registry.entry(MODULE_PCM, 0, 2).unwrap().signature.len(), 4);
    }
}
