#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    trading_desk_lib::run()
}
