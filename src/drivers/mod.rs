pub mod motor_port;
