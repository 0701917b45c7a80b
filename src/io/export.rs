//! CSV export of run summaries, for launchers and offline analysis.
//!
//! Each exporter is a generic `write_*` function over `impl Write` plus a
//! thin `File`-opening wrapper. There is no single per-tick "step result" in
//! this domain, so one row per entity at run's end is the natural unit.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::entities::{Robot, RobotStatus, Vehicle, VehicleStatus};

const VEHICLE_HEADER: &str = "vehicle_id,arrival_minute,departure_minute,status,\
                               initial_energy,final_energy,required_energy,\
                               charging_start_minute,charging_end_minute,\
                               waiting_time_min,charging_time_min";

const ROBOT_HEADER: &str = "robot_id,home_station_x,home_station_y,status,\
                             busy_minutes,utilization_pct";

fn status_label(status: VehicleStatus) -> &'static str {
    match status {
        VehicleStatus::Waiting => "waiting",
        VehicleStatus::Assigned => "assigned",
        VehicleStatus::Charging => "charging",
        VehicleStatus::Completed => "completed",
        VehicleStatus::Failed => "failed",
    }
}

fn robot_status_label(status: RobotStatus) -> &'static str {
    match status {
        RobotStatus::Idle => "idle",
        RobotStatus::MovingToVehicle => "moving_to_vehicle",
        RobotStatus::ChargingVehicle => "charging_vehicle",
        RobotStatus::Returning => "returning",
        RobotStatus::SwappingBattery => "swapping_battery",
    }
}

/// Exports one row per vehicle to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be created or written.
pub fn export_vehicles_csv(vehicles: &[Vehicle], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_vehicles_csv(vehicles, io::BufWriter::new(file))
}

/// Writes one row per vehicle as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_vehicles_csv(vehicles: &[Vehicle], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(VEHICLE_HEADER.split(',').map(str::trim))?;

    for v in vehicles {
        let waiting = v.charging_start_minute.map(|s| (s as i64 - v.arrival_minute as i64).max(0));
        let charging =
            v.charging_end_minute.zip(v.charging_start_minute).map(|(e, s)| (e as i64 - s as i64).max(0));

        wtr.write_record(&[
            v.id.to_string(),
            v.arrival_minute.to_string(),
            v.departure_minute.to_string(),
            status_label(v.status).to_string(),
            format!("{:.2}", v.initial_energy),
            format!("{:.2}", v.current_energy),
            format!("{:.2}", v.required_energy),
            v.charging_start_minute.map_or(String::new(), |m| m.to_string()),
            v.charging_end_minute.map_or(String::new(), |m| m.to_string()),
            waiting.map_or(String::new(), |m| m.to_string()),
            charging.map_or(String::new(), |m| m.to_string()),
        ])?;
    }

    wtr.flush()
}

/// Exports one row per robot to a CSV file at `path`, with utilization
/// computed against `horizon` minutes.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be created or written.
pub fn export_robots_csv(robots: &[Robot], horizon: u32, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_robots_csv(robots, horizon, io::BufWriter::new(file))
}

/// Writes one row per robot as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_robots_csv(robots: &[Robot], horizon: u32, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(ROBOT_HEADER.split(',').map(str::trim))?;

    for r in robots {
        let utilization = if horizon > 0 { r.busy_minutes as f64 / horizon as f64 * 100.0 } else { 0.0 };
        wtr.write_record(&[
            r.id.to_string(),
            format!("{:.2}", r.home_station.x),
            format!("{:.2}", r.home_station.y),
            robot_status_label(r.status).to_string(),
            r.busy_minutes.to_string(),
            format!("{:.2}", utilization),
        ])?;
    }

    wtr.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;

    fn make_vehicle(id: u32) -> Vehicle {
        let mut v = Vehicle::new(id, 0, Point::new(10.0, 10.0), 20.0, 200, 80.0);
        v.status = VehicleStatus::Completed;
        v.current_energy = 80.0;
        v.charging_start_minute = Some(10);
        v.charging_end_minute = Some(60);
        v
    }

    fn make_robot(id: u32) -> Robot {
        let mut r = Robot::new(id, Point::new(0.0, 0.0));
        r.busy_minutes = 30;
        r
    }

    #[test]
    fn vehicle_header_matches_schema() {
        let mut buf = Vec::new();
        write_vehicles_csv(&[], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let first_line = output.lines().next().unwrap();
        assert_eq!(first_line, VEHICLE_HEADER.replace(' ', ""));
    }

    #[test]
    fn robot_header_matches_schema() {
        let mut buf = Vec::new();
        write_robots_csv(&[], 600, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let first_line = output.lines().next().unwrap();
        assert_eq!(first_line, ROBOT_HEADER.replace(' ', ""));
    }

    #[test]
    fn vehicle_row_count_matches_fleet_size() {
        let vehicles: Vec<Vehicle> = (0..5).map(make_vehicle).collect();
        let mut buf = Vec::new();
        write_vehicles_csv(&vehicles, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        // header + 5 rows
        assert_eq!(output.lines().count(), 6);
    }

    #[test]
    fn robot_utilization_is_busy_minutes_over_horizon() {
        let robots = vec![make_robot(0)];
        let mut buf = Vec::new();
        write_robots_csv(&robots, 300, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let row = output.lines().nth(1).unwrap();
        assert!(row.ends_with("10.00"));
    }

    #[test]
    fn deterministic_output() {
        let vehicles: Vec<Vehicle> = (0..3).map(make_vehicle).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_vehicles_csv(&vehicles, &mut buf1).unwrap();
        write_vehicles_csv(&vehicles, &mut buf2).unwrap();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn round_trip_parseable() {
        let vehicles: Vec<Vehicle> = (0..3).map(make_vehicle).collect();
        let mut buf = Vec::new();
        write_vehicles_csv(&vehicles, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().unwrap();
        assert_eq!(headers.len(), 11);

        let mut row_count = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            let energy: Result<f64, _> = rec[4].parse();
            assert!(energy.is_ok());
            row_count += 1;
        }
        assert_eq!(row_count, 3);
    }
}
