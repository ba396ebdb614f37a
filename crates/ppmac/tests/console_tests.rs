use ppmac::cli::format;
use ppmac::status::MOTOR_STATUS;
use ppmac::{CommandProcessor, InterruptController, Output, Session, TransportConnector, get_all_commands};
use ppmac_comm::MockTransport;
use ppmac_completer::{Catalog, Metadata};
use ppmac_config::PpmacConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const SERVO_PERIOD_MS: &str = "0.442673749446658";

fn test_config() -> PpmacConfig {
    let mut config = PpmacConfig::default();
    config.completer.enabled = false;
    config.monitor.poll_interval_ms = 1;
    config
}

fn create_console(mock: &MockTransport, config: PpmacConfig) -> (CommandProcessor, Arc<Session>) {
    format::set_color(false);
    let session = Arc::new(Session::new(
        config,
        Arc::new(TransportConnector::new(Arc::new(mock.clone()))),
        Output::buffer(),
        InterruptController::new(),
    ));
    let (processor, _rx) = CommandProcessor::new(get_all_commands(session.clone()));
    (processor, session)
}

fn controller() -> MockTransport {
    MockTransport::new().with_variable("Sys.ServoPeriod", SERVO_PERIOD_MS)
}

fn meta(comment: &str) -> Metadata {
    BTreeMap::from([("Comments".to_string(), comment.to_string())])
}

#[tokio::test]
async fn test_get_and_set_variables() {
    let mock = controller().with_variable("Motor[1].Servo.Kp", "10");
    let (console, _) = create_console(&mock, test_config());

    assert_eq!(
        console.process_command("get_var Motor[1].Servo.Kp").await,
        "Motor[1].Servo.Kp=10"
    );
    assert_eq!(
        console.process_command("set_var Motor[1].Servo.Kp 20").await,
        "Motor[1].Servo.Kp=20"
    );
    assert_eq!(
        console.process_command("v Motor[1].Servo.Kp").await,
        "Motor[1].Servo.Kp=20"
    );
    assert_eq!(mock.variable("Motor[1].Servo.Kp").as_deref(), Some("20"));
}

#[tokio::test]
async fn test_device_error_is_printed() {
    let mock = controller();
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("get_var Sys.Bogus").await;
    assert!(result.contains("error #20"), "{}", result);
}

#[tokio::test]
async fn test_not_connected_without_auto_connect() {
    let mock = controller();
    let mut config = test_config();
    config.connection.auto_connect = false;
    let (console, session) = create_console(&mock, config);

    assert_eq!(console.process_command("get_var Sys.ServoPeriod").await, "Not connected");
    assert!(mock.commands().is_empty());

    let result = console.process_command("connect -h 10.1.1.1").await;
    assert_eq!(result, "Connected to 10.1.1.1");
    assert!(session.comm().is_some());
    assert_eq!(
        console.process_command("get_var Sys.ServoPeriod").await,
        format!("Sys.ServoPeriod={}", SERVO_PERIOD_MS)
    );
}

#[tokio::test]
async fn test_usage_errors_do_not_touch_the_controller() {
    let mock = controller();
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("set_var Motor[1].Servo.Kp").await;
    assert!(result.contains("Usage"), "{}", result);
    assert!(mock.commands().is_empty());

    let result = console.process_command("servo_copy 2 2").await;
    assert_eq!(result, "Destination motor should be different from source motor");
}

#[tokio::test]
async fn test_wpkey() {
    let mock = controller().with_variable("Sys.WpKey", "0");
    let (console, session) = create_console(&mock, test_config());

    let result = console.process_command("wpkey").await;
    assert_eq!(result, "Sys.WpKey = $AAAAAAAA");
    assert_eq!(session.output().take(), "Enabling\n");

    let result = console.process_command("wpkey -d").await;
    assert_eq!(result, "Sys.WpKey = 0");
    assert_eq!(session.output().take(), "Disabling\n");
}

#[tokio::test]
async fn test_enc_filter() {
    let mock = controller();
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("enc_filter 2 100").await;
    assert_eq!(result, "EncTable[2].index1 = 20\nEncTable[2].index2 = 156");
    assert_eq!(mock.variable("EncTable[2].index2").as_deref(), Some("156"));

    let result = console.process_command("enc_filter 3 0").await;
    assert_eq!(result, "EncTable[3].index1 = 0\nEncTable[3].index2 = 0");
}

#[tokio::test]
async fn test_motors() {
    let mock = controller()
        .with_variable("Motor[1].ActPos", "1010.5")
        .with_variable("Motor[1].HomePos", "10")
        .with_variable("Motor[2].ActPos", "0")
        .with_variable("Motor[2].HomePos", "0");
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("motors 1 3").await;
    let lines: Vec<&str> = result.lines().collect();
    assert_eq!(lines[0], "Motor  1: 1e+03");
    assert_eq!(lines[1], "Motor  2: 0");
    assert!(lines[2].starts_with("Motor  3: Error:"), "{}", lines[2]);
}

#[tokio::test]
async fn test_shell_cmd_reports_exit_status() {
    let mock = controller()
        .with_shell_reply("ls /var/ftp", &["gather", "usrflash"], 0)
        .with_shell_reply("false", &[], 1);
    let (console, _) = create_console(&mock, test_config());

    assert_eq!(console.process_command("shell_cmd ls /var/ftp").await, "gather\nusrflash");
    assert_eq!(console.process_command("shell_cmd false").await, "(exit status 1)");
}

#[tokio::test]
async fn test_motor_status_shows_only_abnormal_values() {
    let mut mock = controller();
    for status in MOTOR_STATUS {
        let value = status.normal.unwrap_or(0).to_string();
        mock = mock.with_variable(&format!("Motor[1].{}", status.name), &value);
    }
    mock.set_variable("Motor[1].AmpFault", "1");
    let (console, session) = create_console(&mock, test_config());

    console.process_command("mstatus 1").await;
    let output = session.output().take();
    assert!(output.contains("Motor[1].AmpFault = 1"), "{}", output);
    assert!(output.contains("Motor[1].InPos = 0"), "{}", output);
    assert!(!output.contains("Motor[1].AmpEna"), "{}", output);

    console.process_command("mstatus 1 -a -i AmpFault").await;
    let output = session.output().take();
    assert!(output.contains("Motor[1].AmpEna = 1"), "{}", output);
    assert!(!output.contains("AmpFault"), "{}", output);
}

#[tokio::test]
async fn test_monitor_prints_changes() {
    let mock = controller().with_sequence("Motor[1].ActPos", &["1", "2", "2"]);
    let (console, session) = create_console(&mock, test_config());

    console.process_command("monitor Motor[1].ActPos -n 2").await;
    assert_eq!(
        session.output().take(),
        "Motor[1].ActPos = 1\nMotor[1].ActPos = 2\n"
    );
}

#[tokio::test]
async fn test_prog_run_until_done() {
    let mock = controller()
        .with_sequence("Coord[1].ProgActive", &["1", "1", "0"])
        .with_variable("Coord[1].ErrorStatus", "0");
    let (console, session) = create_console(&mock, test_config());

    let result = console.process_command("prog_run 1 10").await;
    assert_eq!(result, "Done (Coord[1].ProgActive = 0)");
    assert_eq!(session.output().take(), "Coord 1 Program 10\n");
    assert!(mock.commands().contains(&"&1b10r".to_string()));
}

#[tokio::test]
async fn test_prog_run_reports_error_status() {
    let mock = controller()
        .with_variable("Coord[1].ProgActive", "0")
        .with_variable("Coord[1].ErrorStatus", "7");
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("prog_run 1 10").await;
    assert!(result.contains("Error: (NotReady)"), "{}", result);
}

#[tokio::test]
async fn test_prog_run_start_failure_hint() {
    let mock = controller().with_error("&1b10r", 1, "COORD NOT READY TO RUN");
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("prog_run 1 10").await;
    assert!(result.contains("READY TO RUN"), "{}", result);
    assert!(result.contains("Are all motors in the coordinate system in closed loop?"));
}

#[tokio::test]
async fn test_gather_and_save() {
    let config = test_config();
    let mock = controller().with_file(&config.gather.output_file, "100 1.5\n101 2.5\n102 3.5\n");
    let (console, _) = create_console(&mock, config.clone());

    let result = console.process_command("gather 0.01 1 Motor[1].ActPos").await;
    assert!(result.contains("Motor[1].ActPos.a"), "{}", result);
    assert!(result.contains("3 samples"), "{}", result);
    assert_eq!(mock.variable("Gather.Addr[0]").as_deref(), Some("Sys.ServoCount.a"));
    assert_eq!(mock.variable("Gather.Addr[1]").as_deref(), Some("Motor[1].ActPos.a"));
    assert_eq!(mock.variable("Gather.Enable").as_deref(), Some("0"));
    assert!(
        mock.shell_commands()
            .contains(&format!("gather -u {}", config.gather.output_file))
    );

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("gather.txt");
    console
        .process_command(&format!("gather_save {} {} ,", path.display(), config.gather.config_file))
        .await;
    let saved = std::fs::read_to_string(&path).unwrap();
    assert_eq!(saved.lines().next(), Some("Sys.ServoCount.a,Motor[1].ActPos.a"));
    assert_eq!(saved.lines().count(), 4);
}

#[tokio::test]
async fn test_gather_plot_by_name_and_index() {
    let config = test_config();
    let mock = controller().with_file(&config.gather.output_file, "100 1 10\n101 2 20\n");
    let (console, session) = create_console(&mock, config);

    console
        .process_command("gather 0.01 1 Motor[1].ActPos Motor[1].DesPos")
        .await;
    session.output().take();

    let result = console
        .process_command("gather_plot -l motor[1].actpos -r 2 -R 0.5")
        .await;
    assert!(result.contains("Left axis"), "{}", result);
    assert!(result.contains("Right axis"), "{}", result);
    assert!(session.output().take().starts_with("Available addresses:"));

    let result = console.process_command("gather_plot -l Motor[9].ActPos").await;
    assert_eq!(result, "Address not gathered: Motor[9].ActPos");
}

#[tokio::test]
async fn test_motors_range_overflow() {
    let mock = controller();
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("motors 4294967295 2").await;
    assert_eq!(result, "Motor range 4294967295 + 2 is out of bounds");
    assert!(mock.commands().is_empty());
}

#[tokio::test]
async fn test_out_of_range_times_are_rejected() {
    let mock = controller().with_variable("Motor[1].Servo.Kp", "12");
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("gather 1e300 1 Motor[1].ActPos").await;
    assert!(result.starts_with("Invalid time"), "{}", result);
    assert!(!mock.commands().iter().any(|c| c == "Gather.Enable=2"));

    let result = console.process_command("g -t 1e300 Sys.Time").await;
    assert!(result.starts_with("Invalid time"), "{}", result);

    let result = console.process_command("ramp 1 1e300 1e-300").await;
    assert!(result.contains("invalid duration"), "{}", result);

    let result = console
        .process_command("tune_range ramp.txt 1 1e300 1e-300 -V 1")
        .await;
    assert!(result.contains("invalid duration"), "{}", result);
    assert_eq!(mock.variable("Motor[1].Servo.Kp").as_deref(), Some("12"));
    assert!(!mock.commands().iter().any(|c| c.ends_with("b999r")));
}

#[tokio::test]
async fn test_gpascii_closes_its_channel() {
    let mock = controller();
    let (console, session) = create_console(&mock, test_config());

    console.process_command("g Sys.ServoPeriod").await;
    assert_eq!(
        session.output().take(),
        format!("Sys.ServoPeriod={}\n", SERVO_PERIOD_MS)
    );
    assert_eq!(mock.closed_channels(), 1);
}

#[tokio::test]
async fn test_monitorc_without_changes() {
    let mock = controller()
        .with_variable("Motor[1].Servo.Kp", "12")
        .with_variable("Motor[1].Servo.Ki", "0.001");
    let (console, session) = create_console(&mock, test_config());
    session.set_catalog(Some(Catalog::from_entries([
        ("Motor[].Servo.Kp".to_string(), meta("Proportional gain")),
        ("Motor[].Servo.Ki".to_string(), meta("Integral gain")),
    ])));

    let result = console.process_command("monitorc Motor[1].Servo -n 2").await;
    assert_eq!(result, "");
    let output = session.output().take();
    assert!(output.starts_with("Initial values:"), "{}", output);
    assert!(!output.contains("Variables changed"), "{}", output);

    mock.set_sequence("Motor[1].Servo.Ki", &["0.001", "0.002"]);
    let result = console.process_command("monitorc Motor[1].Servo -n 2").await;
    assert_eq!(result, "Variables changed:\nMotor[1].Servo.Ki");
}

#[tokio::test]
async fn test_gather_plot_falls_back_to_first_column() {
    let config = test_config();
    let mock = controller().with_file(&config.gather.output_file, "100 1\n101 2\n");
    let (console, session) = create_console(&mock, config);

    console.process_command("gather 0.01 1 Motor[1].ActPos").await;
    session.output().take();

    let result = console
        .process_command("gather_plot -x Motor[9].ActPos -l 1")
        .await;
    assert!(result.starts_with("X axis: Sys.ServoCount.a"), "{}", result);
    assert!(result.contains("Left axis"), "{}", result);
    assert!(
        session
            .output()
            .take()
            .contains("Address not gathered: Motor[9].ActPos; using column 0 for the x axis")
    );
}

/// Output of a tuning move on motor `motor`: servo count, desired and
/// actual position.
fn tune_samples() -> &'static str {
    "1 0 0\n2 1 0.5\n3 2 2.5\n"
}

#[tokio::test]
async fn test_ramp_runs_builtin_script() {
    let config = test_config();
    let mock = controller()
        .with_variable("Coord[0].ProgActive", "0")
        .with_file(&config.gather.output_file, tune_samples());
    let (console, session) = create_console(&mock, config);

    let result = console.process_command("ramp 1 10 5 -k").await;
    assert!(result.starts_with("Motor 1\n"), "{}", result);
    assert!(result.contains("RMS following error"), "{}", result);
    assert!(result.contains("Max following error: 0.5"), "{}", result);
    assert!(
        session
            .output()
            .take()
            .starts_with("Running ramp on motor 1")
    );

    let commands = mock.commands();
    for expected in ["&0 #1->X", "open prog 999", "X(10)", "F(5)", "close", "&0b999r", "#1k"] {
        assert!(commands.contains(&expected.to_string()), "missing {}", expected);
    }
    assert_eq!(mock.variable("Gather.Addr[2]").as_deref(), Some("Motor[1].ActPos.a"));
    assert_eq!(mock.variable("Gather.Enable").as_deref(), Some("0"));
    assert_eq!(mock.closed_channels(), 1);
}

#[tokio::test]
async fn test_pyramid_and_tune_range_by_short_name() {
    let config = test_config();
    let mock = controller()
        .with_variable("Coord[0].ProgActive", "0")
        .with_variable("Motor[1].Servo.Kp", "12")
        .with_file(&config.gather.output_file, tune_samples());
    let (console, _) = create_console(&mock, config);

    let result = console.process_command("pyramid 1 10 5").await;
    assert!(result.starts_with("Motor 1\n"), "{}", result);
    assert!(mock.commands().contains(&"X(-3*(10))".to_string()));

    let result = console.process_command("tune_range ramp 1 10 5 -V 1 2").await;
    assert!(result.contains("Motor[1].Servo.Kp"), "{}", result);
    assert!(result.contains("Best"), "{}", result);
    assert!(mock.commands().contains(&"Motor[1].Servo.Kp=2".to_string()));
    assert_eq!(mock.variable("Motor[1].Servo.Kp").as_deref(), Some("12"));
}

#[tokio::test]
async fn test_dt_ramp_runs_trajectory_binary() {
    let config = test_config();
    let settings = "gather.addr[0]=Sys.ServoCount.a\n\
                    gather.addr[1]=Motor[2].DesPos.a\n\
                    gather.addr[2]=Motor[2].ActPos.a\n";
    let mock = controller()
        .with_file(&config.gather.config_file, settings)
        .with_file(&config.gather.output_file, tune_samples());
    let (console, session) = create_console(&mock, config);

    let result = console.process_command("dt_ramp 2 1000 50").await;
    assert!(result.starts_with("Motor 2\n"), "{}", result);
    assert!(
        mock.shell_commands()
            .contains(&"/opt/ppmac/tune/othertrajectory 0 2 1000 50 1 0 1 0 1".to_string())
    );
    assert_eq!(
        session.output().take(),
        "Running ramp trajectory on motor 2\n"
    );
}

fn motion_program(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("move.pmc");
    std::fs::write(&path, "// test move\ninc\nX(10)\n").unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_prog_send_and_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = motion_program(&dir);
    let mock = controller();
    let (console, session) = create_console(&mock, test_config());

    let result = console
        .process_command(&format!("prog_send {} X=1 -c 1 -p 10 -r", script))
        .await;
    assert_eq!(result, "Coord 1 Program 10 started");
    assert_eq!(
        session.output().take(),
        format!("Sent {} as program 10\n", script)
    );
    assert_eq!(
        mock.commands(),
        vec!["&1 undefine", "&1 #1->X", "open prog 10", "inc", "X(10)", "close", "&1b10r"]
    );
    assert_eq!(mock.closed_channels(), 1);
}

#[tokio::test]
async fn test_prog_send_gathers_until_duration() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = motion_program(&dir);
    let config = test_config();
    let mock = controller()
        .with_variable("Coord[1].ProgActive", "1")
        .with_file(&config.gather.output_file, "1 0 0\n2 1 1\n");
    let (console, session) = create_console(&mock, config);

    let result = console
        .process_command(&format!("prog_send {} X=1 -c 1 -p 10 -g --duration 0.2", script))
        .await;
    assert!(result.contains("Motor[1].ActPos.a"), "{}", result);
    assert!(result.contains("2 samples"), "{}", result);
    assert!(
        session
            .output()
            .take()
            .contains("Program 10 still running after 0.2 s")
    );

    let commands = mock.commands();
    assert!(commands.contains(&"&1b10r".to_string()));
    assert!(!commands.contains(&"&1a".to_string()));
    assert_eq!(mock.variable("Gather.Enable").as_deref(), Some("0"));
    assert_eq!(mock.closed_channels(), 1);
}

#[tokio::test]
async fn test_prog_send_gather_interrupted() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = motion_program(&dir);
    let mock = controller().with_variable("Coord[1].ProgActive", "1");
    let (console, session) = create_console(&mock, test_config());

    let interrupter = session.clone();
    let ctrl_c = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            interrupter.interrupt().trigger("test");
        }
    });
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        console.process_command(&format!("prog_send {} X=1 -c 1 -p 10 -g --duration 60", script)),
    )
    .await
    .expect("interrupt should end the program");
    ctrl_c.abort();

    assert_eq!(result, "Interrupted");
    assert!(mock.commands().contains(&"&1a".to_string()));
    assert_eq!(mock.variable("Gather.Enable").as_deref(), Some("0"));
    assert_eq!(mock.closed_channels(), 1);
}

#[tokio::test]
async fn test_tune_range_requires_values() {
    let mock = controller();
    let (console, _) = create_console(&mock, test_config());

    let result = console.process_command("tune_range ramp 1 10 5").await;
    assert_eq!(result, "Must set either --values or --low/--high/--step");
}

#[tokio::test]
async fn test_util_build_uploads_and_cleans_up() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("tool.c");
    std::fs::write(&source, "int main(void) { return 0; }\n").unwrap();

    let mock = controller();
    let (console, session) = create_console(&mock, test_config());

    let result = console
        .process_command(&format!("util_build tool {} -d /tmp/build", source.display()))
        .await;
    assert_eq!(result, "Built tool");

    let shell = mock.shell_commands();
    assert!(shell.contains(&"cat > '/tmp/build/Makefile'".to_string()));
    assert!(shell.contains(&"cat > '/tmp/build/tool.c'".to_string()));
    assert!(shell.contains(&"cd /tmp/build && make".to_string()));
    assert!(mock.file("/tmp/build/tool.c").is_none());
    assert!(mock.file("/tmp/build/Makefile").is_none());
    assert!(session.output().take().contains("Building..."));
}

#[tokio::test]
async fn test_util_build_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("tool.c");
    std::fs::write(&source, "int main(void) { return x; }\n").unwrap();

    let mock = controller().with_shell_reply(
        "cd /tmp/build && make",
        &["tool.c:1: error: 'x' undeclared"],
        2,
    );
    let (console, _) = create_console(&mock, test_config());

    let result = console
        .process_command(&format!("util_build tool {} -d /tmp/build -r", source.display()))
        .await;
    assert_eq!(result, "Build of tool failed");
    assert!(!mock.shell_commands().iter().any(|c| c.starts_with("/tmp/build/tool")));
}

#[tokio::test]
async fn test_userphase_sequence() {
    let mock = controller()
        .with_variable("Motor[1].PhaseCtrl", "1")
        .with_variable("Motor[2].PhaseCtrl", "1");
    let (console, _) = create_console(&mock, test_config());

    console
        .process_command("userphase /var/ftp/usrflash/phase.ko phase_func 1 2 -u")
        .await;

    let shell = mock.shell_commands();
    assert_eq!(shell[0], "rmmod /var/ftp/usrflash/phase.ko");
    assert_eq!(shell[1], "insmod /var/ftp/usrflash/phase.ko");
    assert!(shell.contains(&"/var/ftp/usrflash/userphase -l 2 phase_func".to_string()));
    assert_eq!(mock.variable("Motor[1].PhaseCtrl").as_deref(), Some("1"));
    assert!(mock.commands().contains(&"Motor[2].PhaseCtrl=0".to_string()));
}

#[tokio::test]
async fn test_catalog_commands() {
    let mock = controller()
        .with_variable("Motor[1].Servo.Kp", "12")
        .with_variable("Motor[1].Servo.Ki", "0.001");
    let (console, session) = create_console(&mock, test_config());

    assert_eq!(
        console.process_command("search Motor[1] gain").await,
        "Completer not enabled"
    );

    session.set_catalog(Some(Catalog::from_entries([
        ("Motor[].Servo.Kp".to_string(), meta("Proportional gain")),
        ("Motor[].Servo.Ki".to_string(), meta("Integral gain")),
        ("Motor[].ActPos".to_string(), meta("Actual position")),
    ])));

    let result = console.process_command("search Motor[1] proportional").await;
    assert_eq!(result, "Motor[1].Servo.Kp: Proportional gain");

    let result = console.process_command("complete Motor[1].Servo.K").await;
    assert_eq!(result, "Motor[1].Servo.Ki\nMotor[1].Servo.Kp");

    let result = console.process_command("servo 1 proportional").await;
    assert_eq!(result, format!("{:>15} = {:<30} [Proportional gain]", "Kp", "12"));

    let result = console.process_command("get_var motor[1].servo.kp").await;
    assert_eq!(result, "motor[1].servo.kp=12");
}

#[tokio::test]
async fn test_help_lists_commands_and_aliases() {
    let mock = controller();
    let (console, _) = create_console(&mock, test_config());

    let help = console.process_command("help").await;
    for name in ["gpascii/g", "gather_plot", "mstatus", "cstatus", "dt_scurve", "exit/quit"] {
        assert!(help.contains(name), "missing {}", name);
    }
    assert_eq!(console.process_command("bogus").await, "Unknown command: bogus");
}
