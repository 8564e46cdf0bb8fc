#![windows_subsystem = "windows"]

mod render;
mod resource_strings;

use eframe::egui;
use egui::{Color32, RichText, Vec2};
use egui_modal::Modal;
use relive::{
    register_default_modules, Event, Expr, Gameexe, Instruction, KeyCode, Machine,
    MemoryScenario, MouseButton, OpcodeRegistry, Point, System,
};
use resource_strings::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const INITIAL_WIDTH: f32 = 640.;
const INITIAL_HEIGHT: f32 = 480.;

fn main() -> ExitCode {
    env_logger::init();

    // One argument: the game directory.  Without one, fall back to a picker.
    let game_directory = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => match rfd::FileDialog::new()
            .set_title(TITLE_PICK_GAME_WINDOW)
            .pick_folder()
        {
            Some(path) => path,
            None => {
                eprintln!("{}", ERROR_NO_GAME_DIRECTORY);
                return ExitCode::FAILURE;
            }
        },
    };

    let machine = match build_machine(&game_directory) {
        Ok(machine) => machine,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let options = eframe::NativeOptions {
        initial_window_size: Some(Vec2::from((INITIAL_WIDTH, INITIAL_HEIGHT))),
        ..Default::default()
    };
    match eframe::run_native(
        &format!("{} (v{})", TITLE_APP_WINDOW, VERSION),
        options,
        Box::new(|_cc| Box::new(ReliveApp::new(machine))),
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Finds Gameexe.ini in the game directory, case-insensitively.
fn find_gameexe(directory: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(directory).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.eq_ignore_ascii_case(GAMEEXE_FILE_NAME) {
                return Some(path);
            }
        }
    }
    None
}

fn build_machine(game_directory: &Path) -> Result<Machine, String> {
    let gameexe_path =
        find_gameexe(game_directory).ok_or_else(|| ERROR_NO_GAMEEXE.to_string())?;
    let mut gexe = Gameexe::load(&gameexe_path).map_err(|e| e.to_string())?;
    if !gexe.exists("__GAMEPATH") {
        gexe.parse_line(&format!("__GAMEPATH = \"{}\"", game_directory.display()))
            .map_err(|e| e.to_string())?;
    }

    let system = System::new(gexe).map_err(|e| format!("{}: {}", ERROR_AUDIO_DEVICE, e))?;

    let mut registry = OpcodeRegistry::new();
    register_default_modules(&mut registry);

    let mut machine = Machine::new(system, Box::new(demo_scenario()), Rc::new(registry));
    if let Err(e) = machine.load_global_memory() {
        log::warn!("could not load global memory: {}", e);
    }
    Ok(machine)
}

/// A tiny built-in scene, run until a scenario decoder host is attached.
/// It exercises text reveal, the name construct, pagination and the halt
/// path against whatever Gameexe the game directory provides.
fn demo_scenario() -> MemoryScenario {
    let mut scenario = MemoryScenario::new();
    scenario.add_scene(
        1,
        vec![
            Instruction::Line(1),
            Instruction::Textout("【Relive】RealLive virtual machine boot check.".to_string()),
            Instruction::Opcode {
                module: 3,
                opcode: 3,
                overload: 0,
                args: vec![],
            },
            Instruction::Line(2),
            Instruction::Textout(
                "No scenario decoder is attached; this is the built-in demo scene.".to_string(),
            ),
            Instruction::Opcode {
                module: 3,
                opcode: 17,
                overload: 0,
                args: vec![],
            },
            Instruction::Line(3),
            Instruction::Opcode {
                module: 4,
                opcode: 100,
                overload: 0,
                args: vec![Expr::IntConst(500)],
            },
            Instruction::Halt,
        ],
    );
    scenario
}

struct ReliveApp {
    machine: Machine,
    screen_texture: Option<egui::TextureHandle>,
    ctrl_held: bool,
    quit_requested: bool,
}

impl ReliveApp {
    fn new(machine: Machine) -> Self {
        ReliveApp {
            machine,
            screen_texture: None,
            ctrl_held: false,
            quit_requested: false,
        }
    }
}

impl eframe::App for ReliveApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        // Feed this frame's input to the interpreter.
        self.handle_input(ctx);

        // One cooperative frame of interpretation.
        self.machine.run_one_frame();

        // Paint the composited screen.
        self.render_screen(ctx);

        if self.machine.last_error().is_some() {
            self.render_error_modal(ctx);
        } else if self.machine.halted() {
            // Clean halt: save the persistent banks and leave.
            if let Err(e) = self.machine.save_global_memory() {
                log::warn!("could not save global memory: {}", e);
            }
            self.quit_requested = true;
        }

        if self.quit_requested {
            frame.close();
            return;
        }

        // Pace the next frame: sleep a little when nothing is animating.
        if self.machine.may_sleep() {
            ctx.request_repaint_after(Duration::from_millis(10));
        } else {
            ctx.request_repaint();
        }
    }
}
