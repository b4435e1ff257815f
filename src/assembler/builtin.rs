//! Fixed templates shipped with the service (not stored in the catalog).

/// License file: one auth code per line
pub const AUTHCODES: &str = "{{ auth_key }}\n";

/// OpenStack Heat environment: parameters for `heat-template.yaml`
pub const HEAT_ENVIRONMENT: &str = r#"parameters:
  hostname: {{ hostname | default(value="panos-fw") }}
  image_name: {{ image_name }}
  image_flavor: {{ image_flavor }}
  management_network: {{ management_network }}
  management_subnet: {{ management_subnet }}
  management_ip: {{ management_ip }}
  outside_network: {{ outside_network }}
  outside_subnet: {{ outside_subnet }}
  outside_ip: {{ outside_ip }}
  inside_network: {{ inside_network }}
  inside_subnet: {{ inside_subnet }}
  inside_ip: {{ inside_ip }}
  init_cfg: {{ init_cfg }}
  bootstrap_xml: {{ bootstrap_xml }}
  authcodes: {{ authcodes }}
"#;

/// OpenStack Heat stack for the firewall instance
pub const HEAT_TEMPLATE: &str = r#"heat_template_version: 2016-10-14

description: PAN-OS VM-Series firewall bootstrapped via config drive

parameters:
  hostname: { type: string }
  image_name: { type: string }
  image_flavor: { type: string }
  management_network: { type: string }
  management_subnet: { type: string }
  management_ip: { type: string }
  outside_network: { type: string }
  outside_subnet: { type: string }
  outside_ip: { type: string }
  inside_network: { type: string }
  inside_subnet: { type: string }
  inside_ip: { type: string }
  init_cfg: { type: string }
  bootstrap_xml: { type: string }
  authcodes: { type: string }

resources:
  networks:
    type: heat-networks.yaml
    properties:
      management_network: { get_param: management_network }
      management_subnet: { get_param: management_subnet }
      management_ip: { get_param: management_ip }
      outside_network: { get_param: outside_network }
      outside_subnet: { get_param: outside_subnet }
      outside_ip: { get_param: outside_ip }
      inside_network: { get_param: inside_network }
      inside_subnet: { get_param: inside_subnet }
      inside_ip: { get_param: inside_ip }

  firewall:
    type: OS::Nova::Server
    properties:
      name: { get_param: hostname }
      image: { get_param: image_name }
      flavor: { get_param: image_flavor }
      config_drive: true
      networks:
        - port: { get_attr: [networks, management_port] }
        - port: { get_attr: [networks, outside_port] }
        - port: { get_attr: [networks, inside_port] }
      personality:
        /config/init-cfg.txt: { get_file: {{ init_cfg }} }
{%- if bootstrap_xml %}
        /config/bootstrap.xml: { get_file: {{ bootstrap_xml }} }
{%- endif %}
{%- if authcodes %}
        /license/authcodes: { get_file: {{ authcodes }} }
{%- endif %}

outputs:
  management_ip:
    value: { get_param: management_ip }
"#;

/// OpenStack Heat nested stack creating the three firewall ports
pub const HEAT_NETWORKS: &str = r#"heat_template_version: 2016-10-14

description: Management, outside and inside ports for {{ hostname | default(value="panos-fw") }}

parameters:
  management_network: { type: string, default: {{ management_network }} }
  management_subnet: { type: string, default: {{ management_subnet }} }
  management_ip: { type: string, default: {{ management_ip }} }
  outside_network: { type: string, default: {{ outside_network }} }
  outside_subnet: { type: string, default: {{ outside_subnet }} }
  outside_ip: { type: string, default: {{ outside_ip }} }
  inside_network: { type: string, default: {{ inside_network }} }
  inside_subnet: { type: string, default: {{ inside_subnet }} }
  inside_ip: { type: string, default: {{ inside_ip }} }

resources:
{%- for zone in ["management", "outside", "inside"] %}
  {{ zone }}_port:
    type: OS::Neutron::Port
    properties:
      network: { get_param: {{ zone }}_network }
      port_security_enabled: false
      fixed_ips:
        - subnet: { get_param: {{ zone }}_subnet }
          ip_address: { get_param: {{ zone }}_ip }
{%- endfor %}

outputs:
{%- for zone in ["management", "outside", "inside"] %}
  {{ zone }}_port:
    value: { get_resource: {{ zone }}_port }
{%- endfor %}
"#;
