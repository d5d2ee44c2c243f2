mod doctor;
mod list;

pub use doctor::run_doctor;
pub use list::run_list;
